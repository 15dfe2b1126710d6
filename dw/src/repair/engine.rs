//! RepairOrchestrator - the generate, execute, evaluate, repair state machine

use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ContextConfig, RepairConfig};
use crate::context::{ContextBuilder, ContextError};
use crate::domain::GenerationTask;
use crate::evaluate::{Verdict, evaluate};
use crate::generation::{GenerationRequest, Generator};
use crate::sandbox::Sandbox;
use crate::store::ArtifactStore;

use super::{Attempt, AttemptOutcome, FailureKind, RepairFeedback, Report, TerminalStatus};

/// Fatal errors; everything else is recorded as a failed attempt
#[derive(Debug, Error)]
pub enum RepairError {
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Where the loop is; logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    ContextBuilt,
    Generating,
    Executing,
    Evaluating,
    FailedGeneration,
    Succeeded,
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Succeeded | LoopState::Exhausted)
    }
}

/// Orchestrator knobs that are not part of the task itself
#[derive(Debug, Clone, Default)]
pub struct RepairSettings {
    pub context: ContextConfig,
    /// Longer feedback keeps only its tail in the next prompt
    pub feedback_max_chars: usize,
}

impl RepairSettings {
    pub fn new(context: ContextConfig, repair: &RepairConfig) -> Self {
        Self {
            context,
            feedback_max_chars: repair.feedback_max_chars,
        }
    }
}

/// Per-task mutable state; nothing here outlives `run`
#[derive(Debug)]
struct RunState {
    iteration: u32,
    max_iterations: u32,
    state: LoopState,
    feedback: Option<RepairFeedback>,
    last_artifact: Option<String>,
    attempts: Vec<Attempt>,
}

impl RunState {
    fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            state: LoopState::Init,
            feedback: None,
            last_artifact: None,
            attempts: Vec::with_capacity(max_iterations as usize),
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(iteration = self.iteration, from = ?self.state, to = ?next, "RunState::transition");
        self.state = next;
    }

    /// Store the attempt and carry its feedback and candidate forward
    fn record(&mut self, attempt: Attempt) {
        self.feedback = attempt.feedback.clone();
        if let Some(artifact) = &attempt.artifact {
            self.last_artifact = Some(artifact.clone());
        }
        self.attempts.push(attempt);
    }

    fn budget_left(&self) -> bool {
        self.iteration < self.max_iterations
    }
}

/// Drives one task through the loop
pub struct RepairOrchestrator {
    context_builder: ContextBuilder,
    generator: Arc<dyn Generator>,
    sandbox: Arc<dyn Sandbox>,
    store: Arc<dyn ArtifactStore>,
    settings: RepairSettings,
}

impl RepairOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn ArtifactStore>,
        settings: RepairSettings,
    ) -> Self {
        Self {
            context_builder: ContextBuilder::new(settings.context.clone()),
            generator,
            sandbox,
            store,
            settings,
        }
    }

    /// Run the task to a terminal status
    ///
    /// Only an unreadable source or a failed save is an `Err`; every other
    /// failure is an attempt in the report.
    pub async fn run(&self, task: &GenerationTask) -> Result<Report, RepairError> {
        let source = task.source();
        let max_iterations = task.max_iterations();
        info!(source = %source.display(), provider = %task.provider(), max_iterations, "Starting repair loop");

        let mut run = RunState::new(max_iterations);
        let context = self.context_builder.build(source)?;
        let search = self.context_builder.search_capability(&context);
        run.transition(LoopState::ContextBuilt);
        info!(
            file = %context.file_name(),
            language = %context.language(),
            searchable = context.is_searchable(),
            "Source context built"
        );

        let stdin = task.example().stdin_payload();

        let status = loop {
            run.iteration += 1;
            run.transition(LoopState::Generating);

            let prompt_feedback = run
                .feedback
                .as_ref()
                .map(|f| f.truncated(self.settings.feedback_max_chars));
            let request = GenerationRequest {
                context: &context,
                example: task.example(),
                search: search.clone(),
                iteration: run.iteration,
                max_iterations,
                feedback: prompt_feedback.as_ref(),
                previous_artifact: run.last_artifact.as_deref(),
            };

            let generated = self.generator.generate(request).await;
            let attempt = match generated {
                Ok(artifact) => {
                    run.transition(LoopState::Executing);
                    let result = self.sandbox.execute(&artifact, &stdin).await;

                    run.transition(LoopState::Evaluating);
                    let verdict = evaluate(&result, &task.example().expected_output);
                    let feedback = match &verdict {
                        Verdict::Pass => None,
                        Verdict::Fail { diff_summary } => {
                            Some(RepairFeedback::new(FailureKind::from(&result), diff_summary.clone()))
                        }
                    };
                    Attempt {
                        iteration: run.iteration,
                        artifact: Some(artifact),
                        outcome: AttemptOutcome::Executed(result),
                        verdict,
                        feedback,
                    }
                }
                Err(e) => {
                    run.transition(LoopState::FailedGeneration);
                    warn!(iteration = run.iteration, error = %e, "Generation failed");
                    let error = e.to_string();
                    Attempt {
                        iteration: run.iteration,
                        artifact: None,
                        outcome: AttemptOutcome::GenerationFailed { error: error.clone() },
                        verdict: Verdict::Fail {
                            diff_summary: error.clone(),
                        },
                        feedback: Some(RepairFeedback::new(FailureKind::Generation, error)),
                    }
                }
            };

            info!(iteration = attempt.iteration, outcome = %attempt.summary(), "Attempt finished");
            let passed = attempt.passed();
            run.record(attempt);

            if passed {
                run.transition(LoopState::Succeeded);
                break TerminalStatus::Succeeded {
                    attempt: run.iteration,
                };
            }
            if !run.budget_left() {
                run.transition(LoopState::Exhausted);
                break TerminalStatus::Exhausted;
            }
        };
        debug_assert!(run.state.is_terminal());

        // A failed save leaves the pass standing; the report still carries the artifact
        let (artifact_path, persist_error) = match (status, &run.last_artifact) {
            (TerminalStatus::Succeeded { .. }, Some(artifact)) => match self.store.save(source, artifact, Local::now()) {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    warn!(error = %e, "Failed to save the passing Dockerfile");
                    (None, Some(e.to_string()))
                }
            },
            _ => (None, None),
        };

        info!(?status, attempts = run.attempts.len(), "Repair loop finished");
        Ok(Report {
            source: source.to_path_buf(),
            provider: task.provider().to_string(),
            attempts: run.attempts,
            status,
            artifact_path,
            persist_error,
        })
    }
}
