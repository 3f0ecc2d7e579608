use crate::action::Action;
use crate::context::EditorContext;
use crate::controller::{CanvasParts, Gesture, InteractionController, PointerAffordance};
use crate::input::{KeyEvent, PointerEvent, WheelEvent};
use crate::settings::EditorSettings;
use crate::state::EditorState;
use crate::store::{Change, Store, StoreError};
use pipedag_core::{
    ConnectionKey, Environment, Kernel, PipelineDocument, Step, StepId, Vec2,
};
use pipedag_events::{EditorEvent, EventBus};
use pipedag_graph::{AutoLayouter, CubicBezier, StepRegistry, Viewport, node_center};
use std::time::Instant;
use tracing::info;

const DEFAULT_KERNEL: &str = "python";

/// Line to draw for one connection, in canvas coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEndpoints {
    pub start: StepId,
    /// `None` for the connection currently being dragged out.
    pub end: Option<StepId>,
    pub from: Vec2,
    pub to: Vec2,
    pub selected: bool,
}

impl ConnectionEndpoints {
    pub fn key(&self) -> Option<ConnectionKey> {
        self.end.map(|end| ConnectionKey::new(self.start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingStep {
    pub uuid: StepId,
    pub title: String,
    pub file_path: String,
}

/// One open pipeline on the canvas: store, gestures, view transform and the
/// mounted-step registry, kept consistent after every input.
pub struct EditorSession {
    store: Store,
    controller: InteractionController,
    viewport: Viewport,
    registry: StepRegistry,
    settings: EditorSettings,
    events: EventBus,
    read_only: bool,
    viewport_size: Vec2,
}

impl EditorSession {
    pub fn new(context: &EditorContext) -> Self {
        Self {
            store: Store::new(),
            controller: InteractionController::new(context),
            viewport: Viewport::new(context.settings.canvas.initial_offset),
            registry: StepRegistry::new(),
            settings: context.settings.clone(),
            events: context.events.clone(),
            read_only: context.read_only,
            viewport_size: Vec2::ZERO,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self) -> &EditorState {
        self.store.state()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn save_token(&self) -> u64 {
        self.store.save_token()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        if self.read_only != read_only {
            self.read_only = read_only;
            self.controller.set_read_only(read_only);
            self.events
                .publish(EditorEvent::ReadOnlyChanged { read_only });
        }
    }

    pub fn set_viewport_size(&mut self, size: Vec2) {
        self.viewport_size = size;
    }

    pub fn gesture(&self) -> &Gesture {
        self.controller.gesture()
    }

    pub fn affordance(&self) -> PointerAffordance {
        self.controller.affordance(self.store.state())
    }

    /// Shows a freshly fetched document. Does not schedule a save.
    pub fn load_document(&mut self, document: &PipelineDocument) {
        self.store.reset(document.steps.clone());
        self.refresh();
        info!(
            pipeline = %document.name,
            steps = document.steps.len(),
            "Pipeline loaded into editor"
        );
    }

    /// `base` with the current steps, ready to be persisted.
    pub fn document(&self, base: &PipelineDocument) -> PipelineDocument {
        base.with_steps(self.store.steps().clone())
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Change, StoreError> {
        if self.read_only && action.edits_pipeline() {
            return Err(StoreError::ReadOnly);
        }
        let change = self.store.dispatch(action)?;
        self.refresh();
        Ok(change)
    }

    pub fn pointer_down(&mut self, event: PointerEvent, now: Instant) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.pointer_down(canvas, event, now))
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.pointer_move(canvas, event))
    }

    pub fn pointer_up(&mut self, event: PointerEvent, now: Instant) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.pointer_up(canvas, event, now))
    }

    pub fn wheel(&mut self, event: WheelEvent) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.wheel(canvas, event))
    }

    pub fn key_down(&mut self, event: KeyEvent) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.key_down(canvas, event))
    }

    pub fn key_up(&mut self, event: KeyEvent) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.key_up(canvas, event))
    }

    pub fn center_view(&mut self) -> Result<(), StoreError> {
        self.with_canvas(|controller, canvas| controller.center_view(canvas))
    }

    pub fn zoom_in(&mut self) -> Result<(), StoreError> {
        let size = self.viewport_size;
        self.with_canvas(|controller, canvas| {
            let step = controller.zoom_step();
            controller.zoom_by(canvas, size, step)
        })
    }

    pub fn zoom_out(&mut self) -> Result<(), StoreError> {
        let size = self.viewport_size;
        self.with_canvas(|controller, canvas| {
            let step = controller.zoom_step();
            controller.zoom_by(canvas, size, -step)
        })
    }

    /// Adds a step centered in the visible part of the canvas, selects it and
    /// opens its details.
    pub fn create_step(&mut self, environment: Option<&Environment>) -> Result<StepId, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let scale = self.store.state().scale_factor;
        let step_size = self.settings.canvas.step_size();
        let position =
            self.viewport.client_to_canvas(self.viewport_size / 2.0, scale) - step_size / 2.0;

        let mut step = Step::new(StepId::new_v4(), "")
            .with_position(position)
            .with_kernel(Kernel::new(
                DEFAULT_KERNEL,
                environment.map(|env| env.name.clone()).unwrap_or_default(),
            ));
        step.environment = environment.map(|env| env.uuid.clone());
        let id = step.uuid;

        self.dispatch(Action::CreateStep(step))?;
        self.dispatch(Action::SelectSteps(vec![id]))?;
        self.dispatch(Action::SetOpenedStep(Some(id)))?;
        self.events.publish(EditorEvent::StepOpened { id: Some(id) });
        Ok(id)
    }

    pub fn auto_layout(&mut self) -> Result<Change, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let mut steps = self.store.steps().clone();
        let moved = AutoLayouter::new(self.settings.layout_config()).apply(&mut steps);
        if moved == 0 {
            return Ok(Change::None);
        }
        info!(moved, "Auto-layout repositioned steps");
        self.dispatch(Action::SetSteps(steps))
    }

    /// Whether some selected step has an input outside the selection, which
    /// makes "run incoming" meaningful.
    pub fn selection_has_external_incoming(&self) -> bool {
        let state = self.store.state();
        state.selected_steps.iter().any(|id| {
            state.steps.get(id).is_some_and(|step| {
                step.incoming_connections
                    .iter()
                    .any(|incoming| !state.selected_steps.contains(incoming))
            })
        })
    }

    pub fn opened_step_incoming(&self) -> Vec<IncomingStep> {
        let state = self.store.state();
        let Some(opened) = state.opened_step.and_then(|id| state.steps.get(&id)) else {
            return Vec::new();
        };
        opened
            .incoming_connections
            .iter()
            .filter_map(|id| state.steps.get(id))
            .map(|step| IncomingStep {
                uuid: step.uuid,
                title: step.title.clone(),
                file_path: step.file_path.clone(),
            })
            .collect()
    }

    /// Connection lines for the renderer, including the one being dragged.
    pub fn connection_endpoints(&self) -> Vec<ConnectionEndpoints> {
        let state = self.store.state();
        let mut endpoints: Vec<ConnectionEndpoints> = state
            .connections
            .iter()
            .filter_map(|conn| {
                let end = conn.end?;
                Some(ConnectionEndpoints {
                    start: conn.start,
                    end: Some(end),
                    from: self.step_center(&conn.start)?,
                    to: self.step_center(&end)?,
                    selected: conn.selected,
                })
            })
            .collect();

        if let Some(pending) = &state.new_connection
            && let Some(from) = self.step_center(&pending.start)
        {
            endpoints.push(ConnectionEndpoints {
                start: pending.start,
                end: None,
                from,
                to: pending.end_position.unwrap_or(from),
                selected: false,
            });
        }
        endpoints
    }

    /// Center of a mounted step in canvas coordinates, measured from where it
    /// is rendered on screen.
    fn step_center(&self, id: &StepId) -> Option<Vec2> {
        let handle = self.registry.get(id)?;
        let scale = self.store.state().scale_factor;
        let rendered = self.viewport.canvas_rect_to_client(handle.bounds, scale);
        let container = self.viewport.holder_bounds(scale, self.viewport_size);
        Some(node_center(rendered, container, scale))
    }

    pub fn teardown(&mut self) {
        self.controller.teardown();
    }

    fn with_canvas<R>(
        &mut self,
        f: impl FnOnce(&mut InteractionController, CanvasParts<'_>) -> R,
    ) -> R {
        let Self {
            store,
            controller,
            viewport,
            registry,
            ..
        } = self;
        let result = f(
            controller,
            CanvasParts {
                store,
                viewport,
                registry,
            },
        );
        self.refresh();
        result
    }

    fn refresh(&mut self) {
        self.registry
            .sync_steps(self.store.steps(), self.settings.canvas.step_size());
        let curves = self
            .connection_endpoints()
            .into_iter()
            .filter_map(|line| {
                line.key()
                    .map(|key| (key, CubicBezier::horizontal(line.from, line.to)))
            })
            .collect();
        self.registry.set_connection_curves(curves);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipedag_core::StepMap;

    fn id(raw: u128) -> StepId {
        StepId::from_u128(raw)
    }

    fn document(steps: Vec<Step>) -> PipelineDocument {
        PipelineDocument {
            name: "test".to_string(),
            steps: steps.into_iter().map(|s| (s.uuid, s)).collect::<StepMap>(),
            ..PipelineDocument::default()
        }
    }

    fn session() -> EditorSession {
        let context = EditorContext::default();
        let mut session = EditorSession::new(&context);
        session.set_viewport_size(Vec2::new(1000.0, 800.0));
        session
    }

    #[test]
    fn test_load_document_does_not_bump_token() {
        let mut session = session();
        session.load_document(&document(vec![Step::new(id(1), "a")]));
        assert_eq!(session.save_token(), 0);
        assert_eq!(session.registry().len(), 1);
    }

    #[test]
    fn test_connection_endpoints_use_step_centers() {
        let mut session = session();
        session.load_document(&document(vec![
            Step::new(id(1), "a").with_position(Vec2::new(0.0, 0.0)),
            Step::new(id(2), "b")
                .with_position(Vec2::new(400.0, 100.0))
                .with_incoming([id(1)]),
        ]));
        session.dispatch(Action::SetScaleFactor(0.5)).unwrap();

        let lines = session.connection_endpoints();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].from.distance(Vec2::new(95.0, 52.5)) < 1e-9);
        assert!(lines[0].to.distance(Vec2::new(495.0, 152.5)) < 1e-9);
    }

    #[test]
    fn test_create_step_is_centered_and_opened() {
        let mut session = session();
        let env = Environment {
            uuid: "env-1".to_string(),
            name: "Python 3".to_string(),
            language: "python".to_string(),
        };
        let id = session.create_step(Some(&env)).unwrap();

        let step = &session.state().steps[&id];
        // offset (-1, -1): (1 + 500 - 95, 1 + 400 - 52.5)
        assert_eq!(step.position(), Vec2::new(406.0, 348.5));
        assert_eq!(step.kernel, Kernel::new("python", "Python 3"));
        assert_eq!(step.environment.as_deref(), Some("env-1"));
        assert_eq!(session.state().opened_step, Some(id));
        assert_eq!(session.save_token(), 1);
    }

    #[test]
    fn test_read_only_refuses_edits() {
        let context = EditorContext::default().read_only(true);
        let mut session = EditorSession::new(&context);
        session.load_document(&document(vec![Step::new(id(1), "a")]));

        assert_eq!(session.create_step(None), Err(StoreError::ReadOnly));
        assert_eq!(
            session.dispatch(Action::RemoveSteps(vec![id(1)])),
            Err(StoreError::ReadOnly)
        );
        assert_eq!(
            session.dispatch(Action::SelectSteps(vec![id(1)])),
            Ok(Change::View)
        );
    }

    #[test]
    fn test_auto_layout_bumps_once() {
        let mut session = session();
        session.load_document(&document(vec![
            Step::new(id(1), "a"),
            Step::new(id(2), "b").with_incoming([id(1)]),
        ]));
        assert_eq!(session.auto_layout().unwrap(), Change::Graph);
        assert_eq!(session.save_token(), 1);
        assert_eq!(session.auto_layout().unwrap(), Change::None);
        assert_eq!(
            session.state().steps[&id(1)].position(),
            Vec2::new(20.0, 80.0)
        );
    }

    #[test]
    fn test_selection_and_incoming_helpers() {
        let mut session = session();
        let mut upstream = Step::new(id(1), "load");
        upstream.file_path = "load.ipynb".to_string();
        session.load_document(&document(vec![
            upstream,
            Step::new(id(2), "train").with_incoming([id(1)]),
        ]));

        session.dispatch(Action::SelectSteps(vec![id(2)])).unwrap();
        assert!(session.selection_has_external_incoming());
        session.dispatch(Action::SelectAllSteps).unwrap();
        assert!(!session.selection_has_external_incoming());

        session.dispatch(Action::SetOpenedStep(Some(id(2)))).unwrap();
        assert_eq!(
            session.opened_step_incoming(),
            vec![IncomingStep {
                uuid: id(1),
                title: "load".to_string(),
                file_path: "load.ipynb".to_string()
            }]
        );
    }

    #[test]
    fn test_document_keeps_metadata() {
        let mut session = session();
        let mut base = document(vec![Step::new(id(1), "a")]);
        base.settings = Some(serde_json::json!({"auto_eviction": true}));
        session.load_document(&base);
        session
            .dispatch(Action::MoveSteps {
                ids: vec![id(1)],
                delta: Vec2::new(10.0, 0.0),
            })
            .unwrap();

        let out = session.document(&base);
        assert_eq!(out.settings, base.settings);
        assert_eq!(out.steps[&id(1)].position(), Vec2::new(10.0, 0.0));
    }
}
