use crate::api::{
    EnvironmentRegistry, GateCheck, GateOutcome, PipelineApi, PipelineRef, RunRequest, RunTarget,
    SessionManager,
};
use crate::error::ApiError;
use async_trait::async_trait;
use pipedag_core::{Environment, PipelineDocument, PipelineRun, Session};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const RUNS_ENDPOINT: &str = "/catch/api-proxy/api/runs/";
const JOBS_ENDPOINT: &str = "/catch/api-proxy/api/jobs/";
const SESSIONS_ENDPOINT: &str = "/catch/api-proxy/api/sessions/";
const GATE_ENDPOINT: &str = "/catch/api-proxy/api/validations/environments";

#[derive(Deserialize)]
struct PipelineJsonResponse {
    success: bool,
    #[serde(default)]
    pipeline_json: Option<String>,
}

#[derive(Deserialize)]
struct RunsResponse {
    #[serde(default)]
    runs: Vec<PipelineRun>,
}

#[derive(Deserialize)]
struct GateResponse {
    validation: String,
}

/// Backend client for the pipeline, session, environment and gate endpoints.
#[derive(Clone)]
pub struct HttpPipelineApi {
    base_url: String,
    client: Client,
}

impl HttpPipelineApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn pipeline_url(&self, pipeline: &PipelineRef) -> String {
        self.url(&format!(
            "/async/pipelines/json/{}/{}",
            pipeline.project_uuid, pipeline.pipeline_uuid
        ))
    }

    fn run_url(&self, target: &RunTarget) -> String {
        match target {
            RunTarget::Interactive { run_uuid } => self.url(&format!("{RUNS_ENDPOINT}{run_uuid}")),
            RunTarget::Job { job_uuid, run_uuid } => {
                self.url(&format!("{JOBS_ENDPOINT}{job_uuid}/{run_uuid}"))
            }
        }
    }

    /// Maps non-success statuses to errors, keeping the server's `message`.
    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineApi {
    async fn fetch_pipeline(&self, pipeline: &PipelineRef) -> Result<PipelineDocument, ApiError> {
        let mut request = self.client.get(self.pipeline_url(pipeline));
        if let Some(job) = &pipeline.job {
            request = request.query(&[
                ("job_uuid", job.job_uuid.as_str()),
                ("pipeline_run_uuid", job.run_uuid.as_str()),
            ]);
        }
        let response = Self::check(request.send().await?).await?;
        let body: PipelineJsonResponse = response.json().await?;
        match (body.success, body.pipeline_json) {
            (true, Some(raw)) => Ok(PipelineDocument::from_json(&raw)?),
            _ => Err(ApiError::Status {
                status: StatusCode::OK.as_u16(),
                message: "Could not load pipeline.json".to_string(),
            }),
        }
    }

    async fn save_pipeline(
        &self,
        pipeline: &PipelineRef,
        document: &PipelineDocument,
    ) -> Result<(), ApiError> {
        let form = [("pipeline_json", document.to_json()?)];
        let response = self
            .client
            .post(self.pipeline_url(pipeline))
            .form(&form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn start_run(&self, request: &RunRequest) -> Result<PipelineRun, ApiError> {
        let response = self
            .client
            .post(self.url(RUNS_ENDPOINT))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn cancel_run(&self, target: &RunTarget) -> Result<(), ApiError> {
        let response = self.client.delete(self.run_url(target)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_run(&self, target: &RunTarget) -> Result<PipelineRun, ApiError> {
        let response = self.client.get(self.run_url(target)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn active_runs(&self, pipeline: &PipelineRef) -> Result<Vec<PipelineRun>, ApiError> {
        let response = self
            .client
            .get(self.url(RUNS_ENDPOINT))
            .query(&[
                ("project_uuid", pipeline.project_uuid.as_str()),
                ("pipeline_uuid", pipeline.pipeline_uuid.as_str()),
            ])
            .send()
            .await?;
        let body: RunsResponse = Self::check(response).await?.json().await?;
        Ok(body.runs)
    }
}

#[async_trait]
impl SessionManager for HttpPipelineApi {
    async fn session(&self, pipeline: &PipelineRef) -> Result<Option<Session>, ApiError> {
        let url = self.url(&format!(
            "{SESSIONS_ENDPOINT}{}/{}",
            pipeline.project_uuid, pipeline.pipeline_uuid
        ));
        match Self::check(self.client.get(url).send().await?).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ApiError::NotFound) => {
                debug!(pipeline = %pipeline.pipeline_uuid, "No session for pipeline");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EnvironmentRegistry for HttpPipelineApi {
    async fn environments(&self, project_uuid: &str) -> Result<Vec<Environment>, ApiError> {
        let url = self.url(&format!("/store/environments/{project_uuid}"));
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl GateCheck for HttpPipelineApi {
    async fn check_gate(&self, project_uuid: &str) -> Result<GateOutcome, ApiError> {
        let response = self
            .client
            .post(self.url(GATE_ENDPOINT))
            .json(&json!({ "project_uuid": project_uuid }))
            .send()
            .await?;
        let data: Value = Self::check(response).await?.json().await?;
        let gate: GateResponse = serde_json::from_value(data.clone())?;
        Ok(if gate.validation == "pass" {
            GateOutcome::Pass
        } else {
            GateOutcome::Fail { data }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> HttpPipelineApi {
        HttpPipelineApi::new("http://localhost:8000/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_urls() {
        let api = api();
        let pipeline = PipelineRef::new("proj", "pipe");
        assert_eq!(
            api.pipeline_url(&pipeline),
            "http://localhost:8000/async/pipelines/json/proj/pipe"
        );
        assert_eq!(
            api.run_url(&RunTarget::Interactive {
                run_uuid: "r1".to_string()
            }),
            "http://localhost:8000/catch/api-proxy/api/runs/r1"
        );
        assert_eq!(
            api.run_url(&RunTarget::Job {
                job_uuid: "j1".to_string(),
                run_uuid: "r1".to_string()
            }),
            "http://localhost:8000/catch/api-proxy/api/jobs/j1/r1"
        );
    }

    #[test]
    fn test_pipeline_json_response_shape() {
        let body: PipelineJsonResponse = serde_json::from_str(
            r#"{"success": true, "pipeline_json": "{\"name\": \"p\", \"steps\": {}}"}"#,
        )
        .unwrap();
        let doc = PipelineDocument::from_json(&body.pipeline_json.unwrap()).unwrap();
        assert_eq!(doc.name, "p");
    }
}
