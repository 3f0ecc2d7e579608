use crate::StepId;
use thiserror::Error;

/// Reasons a pipeline cannot be persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Step stored under key {key} declares uuid {uuid}")]
    KeyMismatch { key: StepId, uuid: StepId },

    #[error("Step \"{title}\" has no kernel selected")]
    MissingKernel { step: StepId, title: String },

    #[error("Step {0} is connected to itself")]
    SelfLoop(StepId),

    #[error("Step {step} is connected to {source_step} more than once")]
    DuplicateConnection { step: StepId, source_step: StepId },

    #[error("Step {step} references a step that does not exist: {missing}")]
    DanglingConnection { step: StepId, missing: StepId },

    #[error("The pipeline contains a cycle through {} steps", .path.len())]
    Cycle { path: Vec<StepId> },
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnumConversionError {
    #[error("Invalid execution status: {0}")]
    InvalidExecutionStatus(String),
    #[error("Invalid run type: {0}")]
    InvalidRunType(String),
}
