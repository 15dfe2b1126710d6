//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// dockerwrap - synthesize a working Dockerfile for a script
#[derive(Parser)]
#[command(
    name = "dw",
    about = "Generate, test and repair a Dockerfile until a script produces its expected output",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a Dockerfile for a script and verify it against an example
    Generate {
        /// Source script to containerize
        script: PathBuf,

        /// Example usage file with INPUT: and EXPECTED_OUTPUT: sections
        example: PathBuf,

        /// LLM provider name from config (openai, gemini, anthropic, ...)
        #[arg(short, long)]
        provider: Option<String>,

        /// Maximum generate/repair iterations
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        max_iterations: Option<u32>,

        /// Directory for the passing Dockerfile
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Write the full attempt report as JSON
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Check Docker availability and provider credentials
    Check,
}

/// Result of checking for a required external tool
#[derive(Debug, Clone)]
pub struct ToolCheck {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Run `name args` and parse a version from its output
    pub fn check(name: &'static str, args: &[&str]) -> Self {
        debug!(%name, "ToolCheck::check: called");
        let result = std::process::Command::new(name)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output();

        match result {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Self {
                    name,
                    available: true,
                    version: Some(parse_version(&stdout)),
                }
            }
            _ => {
                debug!(%name, "ToolCheck::check: tool not available");
                Self {
                    name,
                    available: false,
                    version: None,
                }
            }
        }
    }
}

/// Parse version from command output
fn parse_version(output: &str) -> String {
    // Look for patterns like "1.2.3" or "v1.2.3"
    for word in output.split_whitespace() {
        let word = word.trim_start_matches('v');
        if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let version: String = word.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !version.is_empty() {
                return version;
            }
        }
    }
    "unknown".to_string()
}

/// Check all required tools and return their status
pub fn check_required_tools() -> Vec<ToolCheck> {
    debug!("check_required_tools: called");
    vec![ToolCheck::check("docker", &["--version"])]
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dockerwrap")
        .join("logs")
        .join("dockerwrap.log")
}

/// Generate the after_help text with tool checks and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Required Tools:\n");
    for tool in check_required_tools() {
        let icon = if tool.available { "\u{2705}" } else { "\u{274C}" };
        let version = tool.version.as_deref().unwrap_or("not found");
        help.push_str(&format!("  {} {:<10} {}\n", icon, tool.name, version));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
