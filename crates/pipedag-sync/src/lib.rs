//! Persistence and execution bridge between the editor and the pipeline backend.

pub mod api;
pub mod bridge;
pub mod error;
pub mod execution;
pub mod http;
pub mod registry;
pub mod scheduler;

pub use api::{
    EnvironmentRegistry, GateCheck, GateOutcome, JobRunRef, PipelineApi, PipelineRef, RunRequest,
    RunTarget, SessionManager,
};
pub use bridge::{DEFAULT_SAVE_INDICATOR_DELAY, PersistenceBridge};
pub use error::{ApiError, LoadError, RunError, SaveError};
pub use execution::StepExecutionState;
pub use http::HttpPipelineApi;
pub use registry::{CancellationToken, RequestRegistry};
pub use scheduler::{PendingRun, SaveScheduler, SaveTicket};
