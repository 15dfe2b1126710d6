//! Docker-backed sandbox

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;

use super::guard::ResourceGuard;
use super::{ExecutionResult, Sandbox};

/// Name of the Dockerfile inside the build context
const DOCKERFILE_NAME: &str = "Dockerfile";

/// Timeout for the daemon availability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds each candidate in a throwaway context and runs it with limits
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    config: SandboxConfig,
    source: PathBuf,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig, source: impl Into<PathBuf>) -> Self {
        Self {
            config,
            source: source.into(),
        }
    }

    /// Whether the docker daemon answers `docker info`
    pub async fn check_available(docker_bin: &str) -> bool {
        debug!(%docker_bin, "DockerSandbox::check_available: called");
        let probe = Command::new(docker_bin)
            .arg("info")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(error = %e, "DockerSandbox::check_available: launch failed");
                false
            }
            Err(_) => {
                debug!("DockerSandbox::check_available: timed out");
                false
            }
        }
    }

    fn build_args(&self, tag: &str, context_dir: &Path) -> Vec<String> {
        vec![
            "build".to_string(),
            "--rm".to_string(),
            "--force-rm".to_string(),
            "-t".to_string(),
            tag.to_string(),
            "-f".to_string(),
            context_dir.join(DOCKERFILE_NAME).display().to_string(),
            context_dir.display().to_string(),
        ]
    }

    fn run_args(&self, tag: &str, container: &str) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--name".to_string(),
            container.to_string(),
            format!("--memory={}", self.config.memory),
            format!("--memory-swap={}", self.config.memory),
            format!("--cpus={}", self.config.cpus),
            format!("--network={}", self.config.network),
            format!("--pids-limit={}", self.config.pids_limit),
            "--security-opt=no-new-privileges".to_string(),
            tag.to_string(),
        ]
    }

    /// Prepare a build context holding the candidate and a copy of the source
    async fn prepare_context(&self, artifact: &str) -> Result<TempDir, String> {
        let dir = tempfile::Builder::new()
            .prefix("dw-build-")
            .tempdir()
            .map_err(|e| format!("Failed to create build context: {}", e))?;

        tokio::fs::write(dir.path().join(DOCKERFILE_NAME), artifact)
            .await
            .map_err(|e| format!("Failed to write Dockerfile: {}", e))?;

        let file_name = self
            .source
            .file_name()
            .ok_or_else(|| format!("Source path has no file name: {}", self.source.display()))?;
        tokio::fs::copy(&self.source, dir.path().join(file_name))
            .await
            .map_err(|e| format!("Failed to copy {} into build context: {}", self.source.display(), e))?;

        Ok(dir)
    }

    /// Build phase; `Err` carries the log for `BuildFailed`
    async fn build(&self, artifact: &str, tag: &str) -> Result<(), String> {
        debug!(%tag, "DockerSandbox::build: called");
        let context = self.prepare_context(artifact).await?;

        let mut cmd = Command::new(&self.config.docker_bin);
        cmd.args(self.build_args(tag, context.path()))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let limit = self.config.build_timeout();
        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(%tag, "DockerSandbox::build: image built");
                Ok(())
            }
            Ok(Ok(output)) => {
                let code = output.status.code().unwrap_or(-1);
                debug!(%tag, code, "DockerSandbox::build: build failed");
                Err(format!(
                    "docker build exited with code {}\nSTDOUT:\n{}\nSTDERR:\n{}",
                    code,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ))
            }
            Ok(Err(e)) => {
                warn!(docker_bin = %self.config.docker_bin, error = %e, "Failed to launch docker build");
                Err(format!("Failed to launch {} build: {}", self.config.docker_bin, e))
            }
            Err(_) => {
                debug!(%tag, "DockerSandbox::build: timed out");
                Err(format!("docker build timed out after {} seconds", limit.as_secs()))
            }
        }
    }

    /// Run phase; the example input is fed on stdin and the pipe closed
    async fn run(&self, tag: &str, container: &str, stdin: &str) -> ExecutionResult {
        debug!(%tag, %container, "DockerSandbox::run: called");
        let start = Instant::now();

        let mut cmd = Command::new(&self.config.docker_bin);
        cmd.args(self.run_args(tag, container))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(docker_bin = %self.config.docker_bin, error = %e, "Failed to launch docker run");
                return ExecutionResult::RunFailed {
                    exit_code: -1,
                    stderr: format!("Failed to launch {} run: {}", self.config.docker_bin, e),
                };
            }
        };

        let pipe = child.stdin.take();
        let payload = stdin.as_bytes().to_vec();
        let feed = async move {
            if let Some(mut pipe) = pipe {
                // A program that never reads its input closes the pipe early
                if let Err(e) = pipe.write_all(&payload).await {
                    debug!(error = %e, "DockerSandbox::run: stdin write interrupted");
                }
            }
        };

        let limit = self.config.run_timeout();
        let waited = tokio::time::timeout(limit, async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        })
        .await;

        match waited {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let duration = start.elapsed();
                debug!(exit_code, duration_ms = duration.as_millis() as u64, "DockerSandbox::run: exited");
                if output.status.success() {
                    ExecutionResult::Completed {
                        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                        exit_code,
                        duration,
                    }
                } else {
                    ExecutionResult::RunFailed {
                        exit_code,
                        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    }
                }
            }
            Ok(Err(e)) => ExecutionResult::RunFailed {
                exit_code: -1,
                stderr: format!("Failed to collect container output: {}", e),
            },
            Err(_) => {
                debug!(%container, "DockerSandbox::run: timed out");
                ExecutionResult::RunTimedOut { limit }
            }
        }
    }

    async fn build_and_run(&self, artifact: &str, stdin: &str, tag: &str, container: &str) -> ExecutionResult {
        if let Err(log) = self.build(artifact, tag).await {
            return ExecutionResult::BuildFailed { log };
        }
        self.run(tag, container, stdin).await
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn execute(&self, artifact: &str, stdin: &str) -> ExecutionResult {
        let run_id = Uuid::now_v7().simple().to_string();
        debug!(%run_id, "DockerSandbox::execute: called");

        let image = ResourceGuard::image(&self.config.docker_bin, format!("dw-{}", run_id));
        let container = ResourceGuard::container(&self.config.docker_bin, format!("dw-run-{}", run_id));

        let overall = self.config.overall_timeout();
        let result = match tokio::time::timeout(
            overall,
            self.build_and_run(artifact, stdin, image.id(), container.id()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                debug!(%run_id, "DockerSandbox::execute: overall budget exhausted");
                ExecutionResult::RunTimedOut { limit: overall }
            }
        };

        container.release().await;
        image.release().await;

        info!(%run_id, outcome = result.label(), "Sandbox execution finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> DockerSandbox {
        DockerSandbox::new(SandboxConfig::default(), "/tmp/script.py")
    }

    #[test]
    fn test_run_args_apply_limits() {
        let args = sandbox().run_args("dw-abc", "dw-run-abc");

        assert_eq!(args[0], "run");
        assert!(args.contains(&"--rm".to_string()));
        assert!(args.contains(&"-i".to_string()));
        assert!(args.contains(&"--memory=512m".to_string()));
        assert!(args.contains(&"--memory-swap=512m".to_string()));
        assert!(args.contains(&"--cpus=1.0".to_string()));
        assert!(args.contains(&"--network=none".to_string()));
        assert!(args.contains(&"--pids-limit=100".to_string()));
        assert!(args.contains(&"--security-opt=no-new-privileges".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("dw-abc"));
    }

    #[test]
    fn test_build_args_point_at_context() {
        let args = sandbox().build_args("dw-abc", Path::new("/tmp/ctx"));

        assert_eq!(args[0], "build");
        assert!(args.contains(&"--force-rm".to_string()));
        assert!(args.contains(&"dw-abc".to_string()));
        assert!(args.contains(&"/tmp/ctx/Dockerfile".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/ctx"));
    }

    #[tokio::test]
    async fn test_missing_docker_binary_is_build_failure() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("script.py");
        std::fs::write(&script, "print('hi')\n").unwrap();

        let config = SandboxConfig {
            docker_bin: "/nonexistent/docker".to_string(),
            ..SandboxConfig::default()
        };
        let result = DockerSandbox::new(config, &script).execute("FROM scratch\n", "").await;

        let ExecutionResult::BuildFailed { log } = result else {
            panic!("expected build failure, got {:?}", result);
        };
        assert!(log.contains("Failed to launch"));
    }

    #[tokio::test]
    async fn test_check_available_false_without_binary() {
        assert!(!DockerSandbox::check_available("/nonexistent/docker").await);
    }

    #[cfg(unix)]
    mod fake_docker {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        /// Workspace with a source script and a shell stand-in for docker
        struct Fixture {
            dir: TempDir,
            script: PathBuf,
            bin: PathBuf,
            log: PathBuf,
        }

        impl Fixture {
            fn new(build: &str, run: &str) -> Self {
                let dir = TempDir::new().unwrap();
                let script = dir.path().join("reverse.py");
                fs::write(&script, "import sys\nprint(' '.join(reversed(sys.stdin.read().split())))\n").unwrap();

                let log = dir.path().join("calls.log");
                let bin = dir.path().join("docker");
                let body = format!(
                    "#!/bin/sh\ncase \"$1\" in\n  build) {build} ;;\n  run) {run} ;;\n  rm|rmi) echo \"$1 $3\" >> '{log}' ;;\n  info) exit 0 ;;\nesac\n",
                    build = build,
                    run = run,
                    log = log.display()
                );
                fs::write(&bin, body).unwrap();
                fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

                Self { dir, script, bin, log }
            }

            fn sandbox(&self) -> DockerSandbox {
                let config = SandboxConfig {
                    docker_bin: self.bin.display().to_string(),
                    run_timeout_secs: 1,
                    ..SandboxConfig::default()
                };
                DockerSandbox::new(config, &self.script)
            }

            fn cleanup_log(&self) -> Vec<String> {
                fs::read_to_string(&self.log)
                    .unwrap_or_default()
                    .lines()
                    .map(str::to_string)
                    .collect()
            }

            fn cleanup_calls(&self) -> Vec<String> {
                fs::read_to_string(&self.log)
                    .unwrap_or_default()
                    .lines()
                    .map(|l| l.split_whitespace().next().unwrap_or_default().to_string())
                    .collect()
            }
        }

        #[tokio::test]
        async fn test_completed_run_feeds_stdin() {
            let fx = Fixture::new("exit 0", "cat");
            let result = fx.sandbox().execute("FROM python:3.12-slim\n", "Hello world\n").await;

            let ExecutionResult::Completed { stdout, exit_code, .. } = result else {
                panic!("expected completion, got {:?}", result);
            };
            assert_eq!(stdout, "Hello world\n");
            assert_eq!(exit_code, 0);
            assert_eq!(fx.cleanup_calls(), vec!["rm", "rmi"]);
            assert!(fx.dir.path().exists());
        }

        #[tokio::test]
        async fn test_build_failure_carries_log() {
            let fx = Fixture::new("echo 'unknown instruction: RUNN' >&2; exit 1", "exit 0");
            let result = fx.sandbox().execute("RUNN nothing\n", "").await;

            let ExecutionResult::BuildFailed { log } = result else {
                panic!("expected build failure, got {:?}", result);
            };
            assert!(log.contains("unknown instruction: RUNN"));
            assert!(log.contains("exited with code 1"));
            assert_eq!(fx.cleanup_calls(), vec!["rm", "rmi"]);
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_run_failure() {
            let fx = Fixture::new("exit 0", "echo 'ModuleNotFoundError: requests' >&2; exit 3");
            let result = fx.sandbox().execute("FROM python:3.12-slim\n", "").await;

            assert_eq!(
                result,
                ExecutionResult::RunFailed {
                    exit_code: 3,
                    stderr: "ModuleNotFoundError: requests\n".to_string(),
                }
            );
        }

        #[tokio::test]
        async fn test_hanging_container_times_out() {
            let fx = Fixture::new("exit 0", "exec sleep 10");
            let start = Instant::now();
            let result = fx.sandbox().execute("FROM alpine\n", "").await;

            assert_eq!(
                result,
                ExecutionResult::RunTimedOut {
                    limit: Duration::from_secs(1)
                }
            );
            assert!(start.elapsed() < Duration::from_secs(8));
            assert_eq!(fx.cleanup_calls(), vec!["rm", "rmi"]);
        }

        #[tokio::test]
        async fn test_cancelled_execute_removes_container_and_image() {
            let fx = Fixture::new("exit 0", "exec sleep 20");
            let config = SandboxConfig {
                docker_bin: fx.bin.display().to_string(),
                run_timeout_secs: 30,
                ..SandboxConfig::default()
            };
            let sandbox = DockerSandbox::new(config, &fx.script);

            let start = Instant::now();
            let cancelled = tokio::time::timeout(
                Duration::from_millis(800),
                sandbox.execute("FROM alpine\n", "Hello world\n"),
            )
            .await;

            assert!(cancelled.is_err(), "execute should still be running");
            assert!(start.elapsed() < Duration::from_secs(10));

            // Dropping the future ran both guards before timeout returned
            let log = fx.cleanup_log();
            assert_eq!(log.len(), 2, "cleanup log: {:?}", log);
            let container = log[0].strip_prefix("rm dw-run-").expect("container removed first");
            let image = log[1].strip_prefix("rmi dw-").expect("image removed second");
            assert_eq!(container, image);
        }

        #[tokio::test]
        async fn test_check_available_with_fake_daemon() {
            let fx = Fixture::new("exit 0", "exit 0");
            assert!(DockerSandbox::check_available(&fx.bin.display().to_string()).await);
        }
    }
}
