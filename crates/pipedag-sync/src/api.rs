//! Collaborator contracts of the persistence bridge.
//!
//! The bridge only talks to the backend through these traits; [`crate::http`]
//! implements them over HTTP and tests use in-memory fakes.

use crate::error::ApiError;
use async_trait::async_trait;
use pipedag_core::{Environment, PipelineDocument, PipelineRun, RunType, Session, StepId};
use serde::Serialize;
use serde_json::Value;

/// A specific run of a job; pipelines viewed through it are read-only snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunRef {
    pub job_uuid: String,
    pub run_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRef {
    pub project_uuid: String,
    pub pipeline_uuid: String,
    pub job: Option<JobRunRef>,
}

impl PipelineRef {
    pub fn new(project_uuid: impl Into<String>, pipeline_uuid: impl Into<String>) -> Self {
        Self {
            project_uuid: project_uuid.into(),
            pipeline_uuid: pipeline_uuid.into(),
            job: None,
        }
    }

    pub fn with_job(mut self, job_uuid: impl Into<String>, run_uuid: impl Into<String>) -> Self {
        self.job = Some(JobRunRef {
            job_uuid: job_uuid.into(),
            run_uuid: run_uuid.into(),
        });
        self
    }

    pub fn is_job_scoped(&self) -> bool {
        self.job.is_some()
    }
}

/// Body of an interactive run request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub uuids: Vec<StepId>,
    pub project_uuid: String,
    pub run_type: RunType,
    pub pipeline_definition: PipelineDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Interactive { run_uuid: String },
    Job { job_uuid: String, run_uuid: String },
}

impl RunTarget {
    pub fn run_uuid(&self) -> &str {
        match self {
            Self::Interactive { run_uuid } | Self::Job { run_uuid, .. } => run_uuid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Pass,
    /// Environments need a build first; `data` is the server's failure report.
    Fail { data: Value },
}

#[async_trait]
pub trait PipelineApi: Send + Sync {
    async fn fetch_pipeline(&self, pipeline: &PipelineRef) -> Result<PipelineDocument, ApiError>;

    /// Replaces the whole stored document.
    async fn save_pipeline(
        &self,
        pipeline: &PipelineRef,
        document: &PipelineDocument,
    ) -> Result<(), ApiError>;

    async fn start_run(&self, request: &RunRequest) -> Result<PipelineRun, ApiError>;

    async fn cancel_run(&self, target: &RunTarget) -> Result<(), ApiError>;

    async fn fetch_run(&self, target: &RunTarget) -> Result<PipelineRun, ApiError>;

    /// Interactive runs of the pipeline, newest first.
    async fn active_runs(&self, pipeline: &PipelineRef) -> Result<Vec<PipelineRun>, ApiError>;
}

#[async_trait]
pub trait SessionManager: Send + Sync {
    /// `None` when no session was ever started for the pipeline.
    async fn session(&self, pipeline: &PipelineRef) -> Result<Option<Session>, ApiError>;
}

#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    async fn environments(&self, project_uuid: &str) -> Result<Vec<Environment>, ApiError>;
}

#[async_trait]
pub trait GateCheck: Send + Sync {
    async fn check_gate(&self, project_uuid: &str) -> Result<GateOutcome, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_request_wire_format() {
        let request = RunRequest {
            uuids: vec![StepId::from_u128(1)],
            project_uuid: "proj".to_string(),
            run_type: RunType::Incoming,
            pipeline_definition: PipelineDocument {
                name: "p".to_string(),
                ..PipelineDocument::default()
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["run_type"], json!("incoming"));
        assert_eq!(value["project_uuid"], json!("proj"));
        assert_eq!(value["uuids"][0], json!("00000000-0000-0000-0000-000000000001"));
        assert_eq!(value["pipeline_definition"]["name"], json!("p"));
    }

    #[test]
    fn test_pipeline_ref_scope() {
        let plain = PipelineRef::new("proj", "pipe");
        assert!(!plain.is_job_scoped());
        let scoped = plain.with_job("job", "run");
        assert!(scoped.is_job_scoped());
        assert_eq!(scoped.job.unwrap().run_uuid, "run");
    }
}
