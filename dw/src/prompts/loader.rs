//! Prompt Loader
//!
//! Loads prompt templates from the override directory or falls back to
//! embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;

/// Context for the system prompt
#[derive(Debug, Clone, Serialize)]
pub struct SystemPromptContext {
    /// The source is only reachable through `search_in_file`
    pub searchable: bool,
}

/// Repair feedback as shown to the model
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackView {
    pub kind: String,
    pub detail: String,
}

/// Context for the per-iteration generation prompt
#[derive(Debug, Clone, Serialize)]
pub struct GeneratePromptContext {
    pub file_name: String,
    pub language: String,
    pub searchable: bool,
    pub size_bytes: u64,
    /// Full source text; absent for searchable sources
    pub content: Option<String>,
    pub input: String,
    pub expected_output: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub feedback: Option<FeedbackView>,
    pub previous_artifact: Option<String>,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.dockerwrap/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that honours overrides under `root/.dockerwrap/prompts`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, "PromptLoader::new: called");
        let user_dir = root.join(".dockerwrap/prompts");
        let user_dir_exists = user_dir.is_dir();
        debug!(?user_dir, %user_dir_exists, "PromptLoader::new: checking override directory");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    #[cfg(test)]
    pub(crate) fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    /// Prompts are plain text; HTML escaping would mangle source code
    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");

        if let Some(user_dir) = &self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not found in user override");
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        info!("Rendering template '{}'", template_name);

        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
