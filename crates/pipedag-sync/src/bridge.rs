use crate::api::{GateCheck, GateOutcome, PipelineApi, PipelineRef, RunRequest, RunTarget, SessionManager};
use crate::error::{ApiError, LoadError, RunError, SaveError};
use crate::execution::StepExecutionState;
use crate::registry::RequestRegistry;
use crate::scheduler::SaveScheduler;
use parking_lot::Mutex;
use pipedag_core::{ExecutionStatus, PipelineDocument, RunType, StepId};
use pipedag_events::telemetry::{
    CMD_CANCEL_RUN, CMD_FETCH_PIPELINE, CMD_POLL_RUN, CMD_SAVE_PIPELINE, CMD_START_RUN,
    CommandSpan,
};
use pipedag_events::{EditorEvent, EventBus, SaveStatus};
use pipedag_graph::validate_pipeline;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_SAVE_INDICATOR_DELAY: Duration = Duration::from_millis(100);

const RUN_NOT_STARTED_MESSAGE: &str = "The pipeline file could not be found. This pipeline run has not been started. Returning to Job view.";

#[derive(Debug)]
struct BridgeState {
    read_only: bool,
    running: bool,
    cancelling: bool,
    run_uuid: Option<String>,
    execution: StepExecutionState,
    save_status: SaveStatus,
    indicator_deadline: Option<Instant>,
}

/// Moves a pipeline between the editor and the backend.
///
/// Saves validate first and then replace the whole stored document. Runs are
/// sequenced behind a save so the server executes what was just written.
/// Every request goes through a [`RequestRegistry`]; after [`teardown`]
/// results are discarded without touching this bridge.
///
/// [`teardown`]: PersistenceBridge::teardown
pub struct PersistenceBridge {
    pipeline: PipelineRef,
    api: Arc<dyn PipelineApi>,
    events: EventBus,
    registry: RequestRegistry,
    in_flight: AtomicUsize,
    indicator_delay: Duration,
    state: Mutex<BridgeState>,
}

impl PersistenceBridge {
    pub fn new(pipeline: PipelineRef, api: Arc<dyn PipelineApi>, events: EventBus) -> Self {
        let read_only = pipeline.is_job_scoped();
        let run_uuid = pipeline.job.as_ref().map(|job| job.run_uuid.clone());
        Self {
            pipeline,
            api,
            events,
            registry: RequestRegistry::new(),
            in_flight: AtomicUsize::new(0),
            indicator_delay: DEFAULT_SAVE_INDICATOR_DELAY,
            state: Mutex::new(BridgeState {
                read_only,
                running: false,
                cancelling: false,
                run_uuid,
                execution: StepExecutionState::new(),
                save_status: SaveStatus::Saved,
                indicator_deadline: None,
            }),
        }
    }

    pub fn with_indicator_delay(mut self, delay: Duration) -> Self {
        self.indicator_delay = delay;
        self
    }

    pub fn pipeline(&self) -> &PipelineRef {
        &self.pipeline
    }

    pub fn is_read_only(&self) -> bool {
        self.state.lock().read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.read_only, read_only) != read_only
        };
        if changed {
            info!(read_only, "Pipeline edit mode changed");
            self.events.publish(EditorEvent::ReadOnlyChanged { read_only });
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_cancelling(&self) -> bool {
        self.state.lock().cancelling
    }

    pub fn run_uuid(&self) -> Option<String> {
        self.state.lock().run_uuid.clone()
    }

    pub fn execution_state(&self) -> StepExecutionState {
        self.state.lock().execution.clone()
    }

    pub fn step_status(&self, id: &StepId) -> ExecutionStatus {
        self.state.lock().execution.status(id)
    }

    pub fn save_status(&self) -> SaveStatus {
        self.state.lock().save_status
    }

    pub fn saves_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn load(&self) -> Result<PipelineDocument, LoadError> {
        let span = CommandSpan::start(CMD_FETCH_PIPELINE);
        match self.registry.track(self.api.fetch_pipeline(&self.pipeline)).await {
            Ok(document) => {
                span.success();
                info!(pipeline = %document.name, steps = document.steps.len(), "Pipeline fetched");
                self.events.publish(EditorEvent::PipelineLoaded {
                    name: document.name.clone(),
                    step_count: document.steps.len(),
                });
                Ok(document)
            }
            Err(ApiError::Canceled) => {
                debug!("Pipeline fetch canceled");
                Err(LoadError::Canceled)
            }
            Err(e) => {
                span.failure(&e);
                // Job runs copy the pipeline when they start; before that there is nothing to show.
                if let Some(job) = &self.pipeline.job {
                    warn!(job = %job.job_uuid, run = %job.run_uuid, "Pipeline of job run not available");
                    self.events
                        .publish(EditorEvent::error("Error", RUN_NOT_STARTED_MESSAGE));
                    self.events.publish(EditorEvent::NavigateToJob {
                        project_uuid: self.pipeline.project_uuid.clone(),
                        job_uuid: job.job_uuid.clone(),
                    });
                    return Err(LoadError::RunNotStarted {
                        job_uuid: job.job_uuid.clone(),
                        run_uuid: job.run_uuid.clone(),
                    });
                }
                error!(error = %e, "Could not load pipeline");
                Err(LoadError::Api(e))
            }
        }
    }

    /// Validates `document` and writes it.
    ///
    /// Overlapping saves each issue their own write; the status returns to
    /// saved once none is outstanding.
    pub async fn save(&self, document: &PipelineDocument) -> Result<(), SaveError> {
        if self.is_read_only() {
            error!("Save requested for a read-only pipeline");
            return Err(SaveError::ReadOnly);
        }

        if let Err(e) = validate_pipeline(document).into_result() {
            warn!(error = %e, "Pipeline failed validation, not saving");
            self.events.publish(EditorEvent::error("Error", e.to_string()));
            return Err(SaveError::Validation(e));
        }

        let span = CommandSpan::start(CMD_SAVE_PIPELINE);
        span.context(&format!("steps={}", document.steps.len()));
        self.begin_save(Instant::now());

        match self
            .registry
            .track(self.api.save_pipeline(&self.pipeline, document))
            .await
        {
            Ok(()) => {
                span.success();
                self.end_save();
                Ok(())
            }
            Err(ApiError::Canceled) => {
                debug!("Save canceled");
                Err(SaveError::Network(ApiError::Canceled))
            }
            Err(e) => {
                span.failure(&e);
                self.end_save();
                Err(SaveError::Network(e))
            }
        }
    }

    fn begin_save(&self, now: Instant) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.state.lock().indicator_deadline = Some(now + self.indicator_delay);
    }

    fn end_save(&self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if remaining > 0 {
            return;
        }
        let was_saving = {
            let mut state = self.state.lock();
            state.indicator_deadline = None;
            std::mem::replace(&mut state.save_status, SaveStatus::Saved) == SaveStatus::Saving
        };
        if was_saving {
            self.events
                .publish(EditorEvent::SaveStatusChanged(SaveStatus::Saved));
        }
    }

    /// Shows "saving" once a save has been outstanding for the indicator delay.
    pub fn poll_indicator(&self, now: Instant) -> SaveStatus {
        let became_saving = {
            let mut state = self.state.lock();
            match state.indicator_deadline {
                Some(deadline) if now >= deadline && self.saves_in_flight() > 0 => {
                    state.indicator_deadline = None;
                    state.save_status = SaveStatus::Saving;
                    true
                }
                _ => false,
            }
        };
        if became_saving {
            self.events
                .publish(EditorEvent::SaveStatusChanged(SaveStatus::Saving));
        }
        self.save_status()
    }

    /// Checks run preconditions and queues the run behind the next save.
    pub async fn request_run(
        &self,
        sessions: &dyn SessionManager,
        scheduler: &mut SaveScheduler,
        steps: Vec<StepId>,
        run_type: RunType,
    ) -> Result<(), RunError> {
        let session = self.registry.track(sessions.session(&self.pipeline)).await?;
        if !session.is_some_and(|session| session.status.is_running()) {
            let err = RunError::NoActiveSession;
            self.events.publish(EditorEvent::error("Error", err.to_string()));
            return Err(err);
        }
        if self.is_running() {
            let err = RunError::AlreadyRunning;
            self.events.publish(EditorEvent::error("Error", err.to_string()));
            return Err(err);
        }

        debug!(steps = steps.len(), %run_type, "Run queued behind save");
        scheduler.attach_run(steps, run_type);
        Ok(())
    }

    /// Saves if the token moved or a run is pending, then issues that run.
    ///
    /// Returns the uuid of a started run.
    pub async fn flush(
        &self,
        scheduler: &mut SaveScheduler,
        token: u64,
        document: &PipelineDocument,
    ) -> Result<Option<String>, RunError> {
        if !scheduler.is_due(token) {
            return Ok(None);
        }
        let ticket = scheduler.begin(token);
        self.save(document).await?;
        match ticket.run {
            Some(run) => self
                .start_run(run.steps, run.run_type, document)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Request a run and issue it after an immediate save.
    pub async fn run_steps(
        &self,
        sessions: &dyn SessionManager,
        scheduler: &mut SaveScheduler,
        token: u64,
        steps: Vec<StepId>,
        run_type: RunType,
        document: &PipelineDocument,
    ) -> Result<String, RunError> {
        self.request_run(sessions, scheduler, steps, run_type).await?;
        self.flush(scheduler, token, document)
            .await?
            .ok_or(RunError::NothingRunning)
    }

    async fn start_run(
        &self,
        steps: Vec<StepId>,
        run_type: RunType,
        document: &PipelineDocument,
    ) -> Result<String, RunError> {
        self.state.lock().running = true;
        let span = CommandSpan::start(CMD_START_RUN);
        let request = RunRequest {
            uuids: steps,
            project_uuid: self.pipeline.project_uuid.clone(),
            run_type,
            pipeline_definition: document.clone(),
        };

        match self.registry.track(self.api.start_run(&request)).await {
            Ok(run) => {
                span.success();
                {
                    let mut state = self.state.lock();
                    state.execution.merge_run(&run);
                    state.run_uuid = Some(run.uuid.clone());
                }
                info!(run = %run.uuid, %run_type, "Interactive run started");
                self.events.publish(EditorEvent::RunStarted {
                    run_uuid: run.uuid.clone(),
                });
                Ok(run.uuid)
            }
            Err(ApiError::Canceled) => Err(RunError::Api(ApiError::Canceled)),
            Err(e) => {
                span.failure(&e);
                self.state.lock().running = false;
                let err = RunError::StartFailed(
                    e.server_message().unwrap_or("Unknown error").to_string(),
                );
                self.events.publish(EditorEvent::error("Error", err.to_string()));
                Err(err)
            }
        }
    }

    fn run_target(&self) -> Option<RunTarget> {
        match &self.pipeline.job {
            Some(job) => Some(RunTarget::Job {
                job_uuid: job.job_uuid.clone(),
                run_uuid: job.run_uuid.clone(),
            }),
            None => self
                .run_uuid()
                .map(|run_uuid| RunTarget::Interactive { run_uuid }),
        }
    }

    pub async fn cancel_run(&self) -> Result<(), RunError> {
        let target = match self.run_target() {
            Some(target @ RunTarget::Job { .. }) => target,
            Some(target) if self.is_running() => target,
            _ => {
                let err = RunError::NothingRunning;
                self.events.publish(EditorEvent::error("Error", err.to_string()));
                return Err(err);
            }
        };

        let span = CommandSpan::start(CMD_CANCEL_RUN);
        self.state.lock().cancelling = true;
        match self.registry.track(self.api.cancel_run(&target)).await {
            Ok(()) => {
                span.success();
                self.state.lock().cancelling = false;
                self.events.publish(EditorEvent::RunCancelled {
                    run_uuid: target.run_uuid().to_string(),
                });
                Ok(())
            }
            Err(ApiError::Canceled) => Err(RunError::Api(ApiError::Canceled)),
            Err(e) => {
                span.failure(&e);
                self.state.lock().cancelling = false;
                let message = match &target {
                    RunTarget::Job { .. } => "Failed to cancel this job run.".to_string(),
                    RunTarget::Interactive { run_uuid } => {
                        format!("Could not cancel pipeline run for runUuid {run_uuid}")
                    }
                };
                self.events.publish(EditorEvent::error("Error", message));
                Err(RunError::Api(e))
            }
        }
    }

    /// Polls the current run and folds its step statuses in.
    pub async fn refresh_run_status(&self) -> Result<Option<ExecutionStatus>, ApiError> {
        let Some(target) = self.run_target() else {
            return Ok(None);
        };
        let span = CommandSpan::start(CMD_POLL_RUN);
        let run = match self.registry.track(self.api.fetch_run(&target)).await {
            Ok(run) => {
                span.success();
                run
            }
            Err(e) => {
                if !e.is_canceled() {
                    span.failure(&e);
                }
                return Err(e);
            }
        };

        let status = run.status;
        {
            let mut state = self.state.lock();
            state.execution.merge_run(&run);
            match status {
                ExecutionStatus::Pending | ExecutionStatus::Started => state.running = true,
                s if s.is_terminal() => {
                    state.running = false;
                    state.cancelling = false;
                }
                _ => {}
            }
        }

        let event = if status.is_terminal() {
            info!(run = %run.uuid, %status, "Run finished");
            EditorEvent::RunFinished {
                run_uuid: run.uuid,
                status,
            }
        } else {
            EditorEvent::RunStatusChanged {
                run_uuid: run.uuid,
                status,
            }
        };
        self.events.publish(event);
        Ok(Some(status))
    }

    /// Adopts the newest interactive run of the pipeline, if any.
    pub async fn fetch_active_run(&self) -> Result<Option<String>, ApiError> {
        if self.is_read_only() {
            return Ok(None);
        }
        let runs = self
            .registry
            .track(self.api.active_runs(&self.pipeline))
            .await?;
        let Some(run) = runs.into_iter().next() else {
            return Ok(None);
        };
        debug!(run = %run.uuid, "Adopted active run");
        self.state.lock().run_uuid = Some(run.uuid.clone());
        Ok(Some(run.uuid))
    }

    /// Decides edit mode: job runs are always read-only, otherwise the gate
    /// check decides. Gate errors leave the mode as it is.
    pub async fn resolve_read_only(&self, gate: &dyn GateCheck) -> bool {
        if self.pipeline.is_job_scoped() {
            self.set_read_only(true);
            return true;
        }

        match self
            .registry
            .track(gate.check_gate(&self.pipeline.project_uuid))
            .await
        {
            Ok(GateOutcome::Pass) => self.set_read_only(false),
            Ok(GateOutcome::Fail { data }) => {
                debug!(report = %data, "Gate check failed");
                self.set_read_only(true);
                self.events.publish(EditorEvent::BuildRequested {
                    project_uuid: self.pipeline.project_uuid.clone(),
                });
            }
            Err(ApiError::Canceled) => {}
            Err(e) => warn!(error = %e, "Gate check errored, keeping edit mode"),
        }
        self.is_read_only()
    }

    pub fn teardown(&self) {
        self.registry.cancel_all();
        self.state.lock().indicator_deadline = None;
    }
}

impl Drop for PersistenceBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}
