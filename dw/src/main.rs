//! dockerwrap - Dockerfile synthesis with a generate, test and repair loop
//!
//! CLI entry point.

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use dockerwrap::cli::{Cli, Command, check_required_tools, generate_after_help, get_log_path};
use dockerwrap::config::Config;
use dockerwrap::domain::{ExampleUsage, GenerationTask};
use dockerwrap::generation::LlmGenerator;
use dockerwrap::llm::create_client;
use dockerwrap::prompts::PromptLoader;
use dockerwrap::repair::{RepairOrchestrator, RepairSettings, Report, TerminalStatus};
use dockerwrap::sandbox::DockerSandbox;
use dockerwrap::security::{
    SecurityError, check_file_size, detect_prompt_injection, sanitize_stdin, validate_file_path,
};
use dockerwrap::store::FsArtifactStore;

/// Exit code after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Setup logging to file
fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("dockerwrap loaded config: default provider={}", config.llm.default);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Generate {
            script,
            example,
            provider,
            max_iterations,
            output_dir,
            report,
        } => {
            let args = GenerateArgs {
                script,
                example,
                provider,
                max_iterations,
                output_dir,
                report,
            };
            cmd_generate(&config, args).await
        }
        Command::Check => cmd_check(&config).await,
    }
}

struct GenerateArgs {
    script: PathBuf,
    example: PathBuf,
    provider: Option<String>,
    max_iterations: Option<u32>,
    output_dir: Option<PathBuf>,
    report: Option<PathBuf>,
}

/// Validate both input files and load the example usage
fn load_inputs(config: &Config, script: &Path, example: &Path) -> Result<(PathBuf, ExampleUsage)> {
    debug!(?script, ?example, "load_inputs: called");
    let base = config.security.base_dir.as_deref();
    let max = config.security.max_script_bytes;

    let script = validate_file_path(script, base)?;
    check_file_size(&script, max)?;
    let example = validate_file_path(example, base)?;
    check_file_size(&example, max)?;

    let example_text =
        fs::read_to_string(&example).with_context(|| format!("Failed to read {}", example.display()))?;
    if let Some(reason) = detect_prompt_injection(&example_text) {
        return Err(SecurityError::Injection { path: example, reason }.into());
    }

    // Source code routinely trips the shell-metacharacter heuristic, so only warn
    if let Ok(source_text) = fs::read_to_string(&script)
        && let Some(reason) = detect_prompt_injection(&source_text)
    {
        warn!(path = %script.display(), %reason, "Source file looks like it contains prompt injection");
        eprintln!(
            "{} {} may contain prompt injection ({})",
            "Warning:".yellow().bold(),
            script.display(),
            reason
        );
    }

    let parsed = ExampleUsage::parse(&example_text)?;
    let usage = ExampleUsage::new(sanitize_stdin(&parsed.input), parsed.expected_output);
    Ok((script, usage))
}

async fn cmd_generate(config: &Config, args: GenerateArgs) -> Result<ExitCode> {
    debug!(script = ?args.script, example = ?args.example, "cmd_generate: called");
    let (script, usage) = load_inputs(config, &args.script, &args.example)?;

    let provider = config.validate_provider(args.provider.as_deref())?;
    if !DockerSandbox::check_available(&config.sandbox.docker_bin).await {
        return Err(eyre!(
            "Docker is not available ('{} info' failed); start the Docker daemon and retry",
            config.sandbox.docker_bin
        ));
    }

    let max_iterations = NonZeroU32::new(args.max_iterations.unwrap_or(config.repair.max_iterations))
        .ok_or_else(|| eyre!("max-iterations must be at least 1"))?;
    let output_dir = args.output_dir.unwrap_or_else(|| config.storage.output_dir.clone());

    let llm = create_client(&provider)?;
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let generator = Arc::new(LlmGenerator::new(
        llm,
        PromptLoader::new(&cwd),
        config.llm.max_turns,
        provider.max_tokens,
    ));
    let sandbox = Arc::new(DockerSandbox::new(config.sandbox.clone(), &script));
    let store = Arc::new(FsArtifactStore::new(output_dir));
    let orchestrator = RepairOrchestrator::new(
        generator,
        sandbox,
        store,
        RepairSettings::new(config.context.clone(), &config.repair),
    );
    let task = GenerationTask::new(&script, usage, &provider.name, max_iterations);

    println!(
        "Generating Dockerfile for {} with {} ({}), up to {} attempts",
        script.display().to_string().bold(),
        provider.name,
        provider.model,
        max_iterations
    );

    // The losing branch is dropped when select! returns, which releases any
    // in-flight container and image before we report the interrupt
    let outcome = tokio::select! {
        result = orchestrator.run(&task) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(result) = outcome else {
        warn!("Interrupted by user");
        eprintln!("{} sandbox resources released", "Interrupted:".yellow().bold());
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    };
    let report = result?;

    print_report(&report, max_iterations.get());

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &Report, max_iterations: u32) {
    for attempt in &report.attempts {
        let mark = if attempt.passed() { "PASS".green() } else { "FAIL".red() };
        println!(
            "  [{}/{}] {} {}",
            attempt.iteration,
            max_iterations,
            mark,
            attempt.summary()
        );
    }

    match report.status {
        TerminalStatus::Succeeded { attempt } => {
            println!("{} on attempt {}", "Succeeded".green().bold(), attempt);
            if let Some(path) = &report.artifact_path {
                println!("Dockerfile saved to {}", path.display());
            }
            if let Some(error) = &report.persist_error {
                eprintln!("{} {}", "Warning:".yellow().bold(), error);
                if let Some(artifact) = report.final_artifact() {
                    println!("Passing Dockerfile:\n{}", artifact);
                }
            }
        }
        TerminalStatus::Exhausted => {
            println!(
                "{} after {} attempts",
                "Exhausted".red().bold(),
                report.attempts.len()
            );
            if let Some(feedback) = report.attempts.last().and_then(|a| a.feedback.as_ref()) {
                println!("Last failure ({}):\n{}", feedback.kind, feedback.detail);
            }
        }
    }
}

async fn cmd_check(config: &Config) -> Result<ExitCode> {
    debug!("cmd_check: called");
    let ok = "\u{2705}";
    let missing = "\u{274C}";

    println!("Docker:");
    for tool in check_required_tools() {
        let icon = if tool.available { ok } else { missing };
        println!("  {} {:<10} {}", icon, tool.name, tool.version.as_deref().unwrap_or("not found"));
    }
    let daemon = DockerSandbox::check_available(&config.sandbox.docker_bin).await;
    println!(
        "  {} daemon     {}",
        if daemon { ok } else { missing },
        if daemon { "reachable" } else { "unreachable" }
    );

    println!("\nProviders:");
    for name in config.llm.provider_names() {
        match config.llm.resolve(Some(&name)) {
            Ok(provider) => {
                let has_key = provider.get_api_key().is_ok();
                let marker = if name == config.llm.default { " (default)" } else { "" };
                println!(
                    "  {} {:<10} {} via ${}{}",
                    if has_key { ok } else { missing },
                    name,
                    provider.model,
                    provider.api_key_env,
                    marker
                );
            }
            Err(e) => println!("  {} {:<10} {}", missing, name, e),
        }
    }

    Ok(if daemon { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
