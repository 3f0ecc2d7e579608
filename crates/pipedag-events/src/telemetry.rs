//! Structured records for backend commands.
//!
//! A [`CommandSpan`] emits one `command_start` record when opened and exactly
//! one `command_success` or `command_failure` record when closed. All records
//! of a span share a correlation id so they can be joined in the log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{Level, debug, event};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "pipedag::events::telemetry";

pub const CMD_FETCH_PIPELINE: &str = "FetchPipeline";
pub const CMD_SAVE_PIPELINE: &str = "SavePipeline";
pub const CMD_START_RUN: &str = "StartRun";
pub const CMD_CANCEL_RUN: &str = "CancelRun";
pub const CMD_POLL_RUN: &str = "PollRun";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Started,
    Succeeded,
    Failed,
}

impl Outcome {
    fn record_name(self) -> &'static str {
        match self {
            Self::Started => "command_start",
            Self::Succeeded => "command_success",
            Self::Failed => "command_failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_name())
    }
}

/// What a span reported when it closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub correlation_id: Uuid,
    pub outcome: Outcome,
    pub elapsed_ms: u128,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct CommandSpan {
    command: &'static str,
    correlation_id: Uuid,
    started: Instant,
}

impl CommandSpan {
    pub fn start(command: &'static str) -> Self {
        let span = Self {
            command,
            correlation_id: Uuid::new_v4(),
            started: Instant::now(),
        };
        span.emit(Outcome::Started, None);
        span
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Attaches free-form detail to the span at debug level.
    pub fn context(&self, context: &str) {
        debug!(
            target: TELEMETRY_TARGET,
            command = self.command,
            correlation_id = %self.correlation_id,
            context,
            "command_context"
        );
    }

    pub fn success(self) -> CommandRecord {
        self.close(Outcome::Succeeded, None)
    }

    pub fn failure(self, reason: impl fmt::Display) -> CommandRecord {
        self.close(Outcome::Failed, Some(reason.to_string()))
    }

    fn close(self, outcome: Outcome, error: Option<String>) -> CommandRecord {
        let elapsed_ms = self.emit(outcome, error.as_deref());
        CommandRecord {
            command: self.command.to_string(),
            correlation_id: self.correlation_id,
            outcome,
            elapsed_ms,
            error,
        }
    }

    fn emit(&self, outcome: Outcome, error: Option<&str>) -> u128 {
        let elapsed_ms = self.started.elapsed().as_millis();
        match (outcome, error) {
            (Outcome::Failed, reason) => event!(
                target: TELEMETRY_TARGET,
                Level::ERROR,
                command = self.command,
                correlation_id = %self.correlation_id,
                elapsed_ms,
                error = reason.unwrap_or("unclassified"),
                "{outcome}"
            ),
            (Outcome::Started, _) => event!(
                target: TELEMETRY_TARGET,
                Level::INFO,
                command = self.command,
                correlation_id = %self.correlation_id,
                "{outcome}"
            ),
            (Outcome::Succeeded, _) => event!(
                target: TELEMETRY_TARGET,
                Level::INFO,
                command = self.command,
                correlation_id = %self.correlation_id,
                elapsed_ms,
                "{outcome}"
            ),
        }
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_get_distinct_correlation_ids() {
        let first = CommandSpan::start(CMD_POLL_RUN);
        let second = CommandSpan::start(CMD_POLL_RUN);
        assert_ne!(first.correlation_id(), second.correlation_id());
    }

    #[test]
    fn span_carries_correlation_id_to_outcome() {
        let span = CommandSpan::start(CMD_SAVE_PIPELINE);
        let id = span.correlation_id();
        let done = span.success();
        assert_eq!(done.correlation_id, id);
        assert_eq!(done.outcome, Outcome::Succeeded);
        assert_eq!(done.error, None);

        let failed = CommandSpan::start(CMD_START_RUN).failure("session not running");
        assert_eq!(failed.command, CMD_START_RUN);
        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.error.as_deref(), Some("session not running"));
    }

    #[test]
    fn outcome_names_match_log_messages() {
        assert_eq!(Outcome::Started.to_string(), "command_start");
        assert_eq!(Outcome::Failed.to_string(), "command_failure");
    }
}
