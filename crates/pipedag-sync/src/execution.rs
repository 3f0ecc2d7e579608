use pipedag_core::{ExecutionStatus, PipelineRun, StepId};
use std::collections::HashMap;

/// Last known execution status per step. Unknown steps are `IDLE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepExecutionState {
    statuses: HashMap<StepId, ExecutionStatus>,
}

impl StepExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, id: &StepId) -> ExecutionStatus {
        self.statuses.get(id).copied().unwrap_or_default()
    }

    /// Overlays the per-step statuses of `run`. Returns how many changed.
    pub fn merge_run(&mut self, run: &PipelineRun) -> usize {
        let mut changed = 0;
        for step in &run.pipeline_steps {
            let previous = self.statuses.insert(step.step_uuid, step.status);
            if previous != Some(step.status) {
                changed += 1;
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.statuses.clear();
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &ExecutionStatus)> {
        self.statuses.iter()
    }
}
