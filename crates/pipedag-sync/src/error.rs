use pipedag_core::ValidationError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The request was dropped on teardown; never surfaced to the user.
    #[error("Request was canceled")]
    Canceled,
    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Could not decode response: {0}")]
    Decode(String),
    #[error("Resource not found")]
    NotFound,
}

impl ApiError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Message reported by the server, if the failure carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    #[error("The pipeline is read-only")]
    ReadOnly,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Saving failed: {0}")]
    Network(#[from] ApiError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("There is no active session. Please start the session first.")]
    NoActiveSession,
    #[error("The pipeline is currently executing, please wait until it completes.")]
    AlreadyRunning,
    #[error("Could not save before running: {0}")]
    Save(#[from] SaveError),
    #[error("Failed to start interactive run. {0}")]
    StartFailed(String),
    #[error("There is no pipeline running.")]
    NothingRunning,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Loading was canceled")]
    Canceled,
    #[error("Pipeline run {run_uuid} of job {job_uuid} has not been started")]
    RunNotStarted { job_uuid: String, run_uuid: String },
    #[error("Could not load pipeline: {0}")]
    Api(ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_only_for_status_errors() {
        let err = ApiError::Status {
            status: 500,
            message: "session crashed".to_string(),
        };
        assert_eq!(err.server_message(), Some("session crashed"));
        assert_eq!(ApiError::NotFound.server_message(), None);
        assert_eq!(
            ApiError::Status {
                status: 502,
                message: String::new()
            }
            .server_message(),
            None
        );
    }

    #[test]
    fn test_decode_errors_from_serde() {
        let err: ApiError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_run_error_messages() {
        assert_eq!(
            RunError::StartFailed("Unknown error".to_string()).to_string(),
            "Failed to start interactive run. Unknown error"
        );
        assert_eq!(
            RunError::NothingRunning.to_string(),
            "There is no pipeline running."
        );
    }
}
