use crate::{EnumConversionError, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Pending,
    Started,
    Success,
    Failure,
    Aborted,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Aborted => "ABORTED",
        }
    }

    /// A run or step in a terminal state will not change any more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Aborted)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = EnumConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(Self::Idle),
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "ABORTED" => Ok(Self::Aborted),
            other => Err(EnumConversionError::InvalidExecutionStatus(other.to_string())),
        }
    }
}

/// Which steps an interactive run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// Exactly the given steps.
    Selection,
    /// The given steps plus everything upstream of them.
    Incoming,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selection => write!(f, "selection"),
            Self::Incoming => write!(f, "incoming"),
        }
    }
}

impl FromStr for RunType {
    type Err = EnumConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "selection" => Ok(Self::Selection),
            "incoming" => Ok(Self::Incoming),
            other => Err(EnumConversionError::InvalidRunType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRunStatus {
    pub step_uuid: StepId,
    #[serde(default)]
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub uuid: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub pipeline_steps: Vec<StepRunStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineRun {
    pub fn new(uuid: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            uuid: uuid.into(),
            status,
            pipeline_steps: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Interactive session state as reported by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    Running,
    Launching,
    Stopping,
    Other(String),
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<String> for SessionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "RUNNING" => Self::Running,
            "LAUNCHING" => Self::Launching,
            "STOPPING" => Self::Stopping,
            _ => Self::Other(value),
        }
    }
}

impl From<SessionStatus> for String {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Running => "RUNNING".to_string(),
            SessionStatus::Launching => "LAUNCHING".to_string(),
            SessionStatus::Stopping => "STOPPING".to_string(),
            SessionStatus::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub status: SessionStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An execution environment a step can run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub language: String,
}
