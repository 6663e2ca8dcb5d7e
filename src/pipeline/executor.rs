use super::{ComputationStep, TaskContext};
use crate::errors::{CeError, Result};
use crate::observability::Profiler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span};

/// Progress of a [`StepExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Pending,
    /// Index of the step being executed
    Running(usize),
    Done,
    /// Index of the step that failed
    Failed(usize),
}

/// Timing information for a computation step.
#[derive(Debug, Clone)]
pub struct StepTiming {
    pub name: String,
    pub duration: Duration,
}

impl StepTiming {
    /// Format the timing as a human-readable string.
    pub fn format(&self) -> String {
        format!("{}: {:.2}s", self.name, self.duration.as_secs_f64())
    }
}

/// Runs an ordered list of steps against one task context.
///
/// Execution stops at the first failing step; its error is returned wrapped
/// in [`CeError::Step`] and no later step runs.
pub struct StepExecutor {
    steps: Vec<Box<dyn ComputationStep>>,
    state: ExecutorState,
    profiler: Option<Arc<Profiler>>,
}

impl StepExecutor {
    pub fn new(steps: Vec<Box<dyn ComputationStep>>) -> Self {
        Self {
            steps,
            state: ExecutorState::Pending,
            profiler: None,
        }
    }

    /// Also record step durations into `profiler`.
    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn descriptions(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.description()).collect()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Execute every step once. An executor cannot be re-run.
    pub fn execute(&mut self, ctx: &mut TaskContext) -> Result<Vec<StepTiming>> {
        if self.state != ExecutorState::Pending {
            return Err(CeError::state(format!(
                "Step executor cannot run from state {:?}",
                self.state
            )));
        }

        let total = self.steps.len();
        let mut timings = Vec::with_capacity(total);
        for (i, step) in self.steps.iter().enumerate() {
            self.state = ExecutorState::Running(i);
            let description = step.description();
            let span = info_span!("step", index = i + 1, total, name = description);
            let _guard = span.enter();

            let start = Instant::now();
            let outcome = step.execute(ctx);
            let duration = start.elapsed();
            if let Some(profiler) = &self.profiler {
                profiler.record(description, duration, 0);
            }

            if let Err(err) = outcome {
                self.state = ExecutorState::Failed(i);
                error!(error = %err, "Step failed");
                return Err(CeError::step(description, err));
            }

            let timing = StepTiming {
                name: description.to_string(),
                duration,
            };
            info!("{}", timing.format());
            timings.push(timing);
        }

        self.state = ExecutorState::Done;
        Ok(timings)
    }
}
