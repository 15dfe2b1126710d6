//! Dockerwrap configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::LlmError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Context Builder policy
    pub context: ContextConfig,

    /// Docker sandbox limits and timeouts
    pub sandbox: SandboxConfig,

    /// Repair loop budget
    pub repair: RepairConfig,

    /// Where successful Dockerfiles are written
    pub storage: StorageConfig,

    /// Upstream input validation
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .dockerwrap.yml
        let local_config = PathBuf::from(".dockerwrap.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/dockerwrap/dockerwrap.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dockerwrap").join("dockerwrap.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed here; the full `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Fail fast when the selected provider is unknown or has no API key
    pub fn validate_provider(&self, provider: Option<&str>) -> Result<ResolvedProvider> {
        let resolved = self.llm.resolve(provider)?;
        resolved.get_api_key()?;
        Ok(resolved)
    }
}

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiKind {
    /// OpenAI Chat Completions (also Gemini's OpenAI-compatible endpoint)
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic Messages
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiKind::OpenAi => write!(f, "openai"),
            ApiKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// One named provider entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api: ApiKind,

    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "max-tokens", default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_ms() -> u64 {
    120_000
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when --provider is not given
    pub default: String,

    /// Upper bound on tool-calling turns within one generation call
    #[serde(rename = "max-turns")]
    pub max_turns: u32,

    /// Named providers; merged over the built-in ones
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default: "openai".to_string(),
            max_turns: 10,
            providers: builtin_providers(),
        }
    }
}

fn builtin_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderConfig {
            api: ApiKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        },
    );
    providers.insert(
        "gemini".to_string(),
        ProviderConfig {
            api: ApiKind::OpenAi,
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        },
    );
    providers.insert(
        "anthropic".to_string(),
        ProviderConfig {
            api: ApiKind::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        },
    );
    providers
}

impl LlmConfig {
    /// Names of every provider reachable through `resolve`
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = builtin_providers().into_keys().collect();
        for name in self.providers.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Resolve a provider by name, or the default one
    pub fn resolve(&self, name: Option<&str>) -> Result<ResolvedProvider> {
        let name = name.unwrap_or(&self.default);
        debug!(%name, "LlmConfig::resolve: called");
        let provider = match self.providers.get(name) {
            Some(p) => p.clone(),
            None => builtin_providers().remove(name).ok_or_else(|| {
                eyre::eyre!(
                    "Unknown LLM provider: '{}'. Available: {}",
                    name,
                    self.provider_names().join(", ")
                )
            })?,
        };

        Ok(ResolvedProvider {
            name: name.to_string(),
            api: provider.api,
            model: provider.model,
            api_key_env: provider.api_key_env,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            max_tokens: provider.max_tokens,
            timeout_ms: provider.timeout_ms,
        })
    }
}

/// A fully resolved provider, ready to build a client from
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub api: ApiKind,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl ResolvedProvider {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> std::result::Result<String, LlmError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LlmError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            }),
        }
    }
}

/// Context Builder policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Files strictly smaller than this are embedded; others become searchable
    #[serde(rename = "embed-threshold-bytes")]
    pub embed_threshold_bytes: u64,

    #[serde(rename = "max-search-results")]
    pub max_search_results: usize,

    #[serde(rename = "default-context-lines")]
    pub default_context_lines: usize,

    #[serde(rename = "max-context-lines")]
    pub max_context_lines: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            embed_threshold_bytes: 100 * 1024,
            max_search_results: 50,
            default_context_lines: 2,
            max_context_lines: 10,
        }
    }
}

/// Docker sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker CLI executable
    #[serde(rename = "docker-bin")]
    pub docker_bin: String,

    #[serde(rename = "build-timeout-secs")]
    pub build_timeout_secs: u64,

    #[serde(rename = "run-timeout-secs")]
    pub run_timeout_secs: u64,

    /// Wall-clock ceiling over build and run together
    #[serde(rename = "overall-timeout-secs")]
    pub overall_timeout_secs: u64,

    /// Memory ceiling in docker syntax (also used as the swap ceiling)
    pub memory: String,

    pub cpus: String,

    #[serde(rename = "pids-limit")]
    pub pids_limit: u32,

    pub network: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            build_timeout_secs: 120,
            run_timeout_secs: 30,
            overall_timeout_secs: 180,
            memory: "512m".to_string(),
            cpus: "1.0".to_string(),
            pids_limit: 100,
            network: "none".to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

/// Repair loop budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Feedback longer than this keeps only its tail in the next prompt
    #[serde(rename = "feedback-max-chars")]
    pub feedback_max_chars: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            feedback_max_chars: 8000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_dockerfiles"),
        }
    }
}

/// Upstream input validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    #[serde(rename = "max-script-bytes")]
    pub max_script_bytes: u64,

    /// When set, input files must resolve inside this directory
    #[serde(rename = "base-dir")]
    pub base_dir: Option<PathBuf>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_script_bytes: 500 * 1024,
            base_dir: None,
        }
    }
}
