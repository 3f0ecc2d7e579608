use crate::action::Action;
use crate::context::EditorContext;
use crate::input::{Key, KeyEvent, PointerButton, PointerEvent, WheelEvent};
use crate::settings::InteractionSettings;
use crate::state::EditorState;
use crate::store::{Store, StoreError};
use crate::timers::DeadlineSlot;
use pipedag_core::{RunType, StepId, Vec2};
use pipedag_events::{EditorEvent, EventBus};
use pipedag_graph::{HitResult, StepRegistry, Viewport, scale_corrected_vec};
use std::time::Instant;
use tracing::debug;

/// The pieces of an editor session a gesture may touch.
pub struct CanvasParts<'a> {
    pub store: &'a mut Store,
    pub viewport: &'a mut Viewport,
    pub registry: &'a StepRegistry,
}

impl CanvasParts<'_> {
    fn scale(&self) -> f64 {
        self.store.state().scale_factor
    }

    fn holder(&self) -> Vec2 {
        self.viewport.holder_position(self.scale())
    }

    fn hit(&self, client: Vec2) -> HitResult {
        let point = self.viewport.client_to_canvas(client, self.scale());
        self.registry.hit_test(point)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Idle,
    BoxSelecting {
        moved: bool,
    },
    Panning {
        last: Vec2,
    },
    Connecting {
        start: StepId,
    },
    DraggingSteps {
        step: StepId,
        ids: Vec<StepId>,
        last: Vec2,
        moved: bool,
        toggle: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAffordance {
    Default,
    ReadyToPan,
    Panning,
    Connecting,
}

/// Turns raw pointer and keyboard input into store actions.
///
/// Time is passed in by the caller so click disambiguation is deterministic.
pub struct InteractionController {
    gesture: Gesture,
    last_click: DeadlineSlot<StepId>,
    settings: InteractionSettings,
    initial_offset: Vec2,
    read_only: bool,
    events: EventBus,
}

impl InteractionController {
    pub fn new(context: &EditorContext) -> Self {
        Self {
            gesture: Gesture::Idle,
            last_click: DeadlineSlot::new(),
            settings: context.settings.interaction.clone(),
            initial_offset: context.settings.canvas.initial_offset,
            read_only: context.read_only,
            events: context.events.clone(),
        }
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn affordance(&self, state: &EditorState) -> PointerAffordance {
        match self.gesture {
            Gesture::Panning { .. } => PointerAffordance::Panning,
            Gesture::Connecting { .. } => PointerAffordance::Connecting,
            _ if state.is_key_down(Key::Space) => PointerAffordance::ReadyToPan,
            _ => PointerAffordance::Default,
        }
    }

    pub fn pointer_down(
        &mut self,
        canvas: CanvasParts<'_>,
        event: PointerEvent,
        now: Instant,
    ) -> Result<(), StoreError> {
        if event.button != PointerButton::Primary {
            return Ok(());
        }
        self.last_click.take_expired(now);

        let client = event.position;
        if canvas.store.state().is_key_down(Key::Space) {
            self.gesture = Gesture::Panning { last: client };
            return Ok(());
        }

        let holder = canvas.holder();
        self.gesture = match canvas.hit(client) {
            HitResult::OutgoingHandle(start) if !self.read_only => {
                canvas
                    .store
                    .dispatch(Action::CreateConnectionInstance { start })?;
                canvas
                    .store
                    .dispatch(Action::UpdateNewConnectionEndNode { client, holder })?;
                Gesture::Connecting { start }
            }
            HitResult::OutgoingHandle(step) | HitResult::IncomingHandle(step) | HitResult::Step(step) => {
                let state = canvas.store.state();
                let ids = if state.is_selected(&step) {
                    state.selected_steps.iter().copied().collect()
                } else {
                    vec![step]
                };
                Gesture::DraggingSteps {
                    step,
                    ids,
                    last: client,
                    moved: false,
                    toggle: event.modifiers.command(),
                }
            }
            HitResult::Connection(key) => {
                canvas.store.dispatch(Action::SelectConnection(key))?;
                Gesture::Idle
            }
            HitResult::None => {
                canvas
                    .store
                    .dispatch(Action::OnMouseDownCanvas { client, holder })?;
                Gesture::BoxSelecting { moved: false }
            }
        };
        Self::log_gesture(&self.gesture);
        Ok(())
    }

    pub fn pointer_move(
        &mut self,
        canvas: CanvasParts<'_>,
        event: PointerEvent,
    ) -> Result<(), StoreError> {
        let client = event.position;
        let scale = canvas.scale();
        let holder = canvas.holder();

        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Panning { last } => {
                canvas.viewport.pan_by(client - *last);
                *last = client;
            }
            Gesture::BoxSelecting { moved } => {
                canvas
                    .store
                    .dispatch(Action::UpdateStepSelector { client, holder })?;
                *moved = true;
            }
            Gesture::Connecting { .. } => {
                canvas
                    .store
                    .dispatch(Action::UpdateNewConnectionEndNode { client, holder })?;
            }
            Gesture::DraggingSteps {
                ids, last, moved, ..
            } => {
                if self.read_only {
                    return Ok(());
                }
                let delta = scale_corrected_vec(client - *last, scale);
                if delta != Vec2::ZERO {
                    canvas.store.dispatch(Action::MoveSteps {
                        ids: ids.clone(),
                        delta,
                    })?;
                    *last = client;
                    *moved = true;
                }
            }
        }
        Ok(())
    }

    pub fn pointer_up(
        &mut self,
        canvas: CanvasParts<'_>,
        event: PointerEvent,
        now: Instant,
    ) -> Result<(), StoreError> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Idle | Gesture::Panning { .. } => {}
            Gesture::BoxSelecting { moved } => {
                canvas.store.dispatch(Action::EndStepSelector)?;
                if !moved {
                    canvas.store.dispatch(Action::DeselectSteps)?;
                    canvas.store.dispatch(Action::DeselectConnection)?;
                }
            }
            Gesture::Connecting { .. } => match canvas.hit(event.position).step() {
                Some(end) => {
                    canvas.store.dispatch(Action::MakeConnection { end })?;
                }
                None => {
                    canvas.store.dispatch(Action::CancelNewConnection)?;
                }
            },
            Gesture::DraggingSteps {
                step,
                moved,
                toggle,
                ..
            } => {
                if moved {
                    self.last_click.cancel();
                    canvas.store.request_save();
                } else if toggle {
                    canvas.store.dispatch(Action::ToggleStepSelection(step))?;
                } else {
                    self.click_step(canvas.store, step, now)?;
                }
            }
        }
        Ok(())
    }

    fn click_step(&mut self, store: &mut Store, step: StepId, now: Instant) -> Result<(), StoreError> {
        if self.last_click.live(now) == Some(&step) {
            self.last_click.cancel();
            let event = if self.read_only {
                EditorEvent::OpenFilePreview { id: step }
            } else {
                EditorEvent::OpenNotebook { id: step }
            };
            self.events.publish(event);
            return Ok(());
        }

        store.dispatch(Action::SelectSteps(vec![step]))?;
        store.dispatch(Action::DeselectConnection)?;
        store.dispatch(Action::SetOpenedStep(Some(step)))?;
        self.events.publish(EditorEvent::StepOpened { id: Some(step) });
        self.last_click
            .arm(step, now + self.settings.double_click_timeout());
        Ok(())
    }

    /// Zooms about the cursor.
    pub fn wheel(&mut self, canvas: CanvasParts<'_>, event: WheelEvent) -> Result<(), StoreError> {
        let scale = canvas.scale();
        let target = Viewport::wheel_scale(
            scale,
            event.delta_y,
            event.delta_mode,
            self.settings.scroll_line_height,
            self.settings.wheel_zoom_divisor,
        );
        let new_scale = canvas.viewport.zoom_about(event.position, scale, target);
        if canvas.store.dispatch(Action::SetScaleFactor(new_scale))?.is_view() {
            self.events.publish(EditorEvent::ZoomChanged { scale: new_scale });
        }
        Ok(())
    }

    /// Zoom button handler: pivots on the viewport center, then adds `delta`.
    pub fn zoom_by(
        &mut self,
        canvas: CanvasParts<'_>,
        viewport_size: Vec2,
        delta: f64,
    ) -> Result<(), StoreError> {
        let scale = canvas.scale();
        let new_scale = canvas
            .viewport
            .zoom_about(viewport_size / 2.0, scale, scale + delta);
        if canvas.store.dispatch(Action::SetScaleFactor(new_scale))?.is_view() {
            self.events.publish(EditorEvent::ZoomChanged { scale: new_scale });
        }
        Ok(())
    }

    pub fn zoom_step(&self) -> f64 {
        self.settings.zoom_step
    }

    pub fn center_view(&mut self, canvas: CanvasParts<'_>) -> Result<(), StoreError> {
        canvas.store.dispatch(Action::SetScaleFactor(1.0))?;
        canvas.viewport.reset(self.initial_offset);
        self.events.publish(EditorEvent::CenterView);
        Ok(())
    }

    pub fn key_down(&mut self, canvas: CanvasParts<'_>, event: KeyEvent) -> Result<(), StoreError> {
        if event.input_focused {
            return Ok(());
        }

        match event.key {
            Key::Space => {
                if !canvas.store.state().is_key_down(Key::Space) {
                    canvas.store.dispatch(Action::key_down(Key::Space, true))?;
                }
            }
            Key::Delete | Key::Backspace => {
                if !self.read_only {
                    self.delete_selection(canvas.store)?;
                }
            }
            Key::Char('a' | 'A') if event.modifiers.command() => {
                canvas.store.dispatch(Action::SelectAllSteps)?;
            }
            Key::Enter if event.modifiers.command() => {
                let steps: Vec<StepId> =
                    canvas.store.state().selected_steps.iter().copied().collect();
                if !steps.is_empty() {
                    self.events.publish(EditorEvent::RunRequested {
                        steps,
                        run_type: RunType::Selection,
                    });
                }
            }
            Key::Escape => {
                if matches!(self.gesture, Gesture::Connecting { .. }) {
                    self.gesture = Gesture::Idle;
                    canvas.store.dispatch(Action::CancelNewConnection)?;
                }
                canvas.store.dispatch(Action::DeselectSteps)?;
                canvas.store.dispatch(Action::DeselectConnection)?;
                if canvas.store.dispatch(Action::SetOpenedStep(None))?.is_view() {
                    self.events.publish(EditorEvent::StepOpened { id: None });
                }
            }
            Key::Char('h' | 'H') if !event.modifiers.any() => {
                self.center_view(canvas)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn key_up(&mut self, canvas: CanvasParts<'_>, event: KeyEvent) -> Result<(), StoreError> {
        if event.key == Key::Space {
            canvas.store.dispatch(Action::key_down(Key::Space, false))?;
            if matches!(self.gesture, Gesture::Panning { .. }) {
                self.gesture = Gesture::Idle;
            }
        }
        Ok(())
    }

    fn delete_selection(&mut self, store: &mut Store) -> Result<(), StoreError> {
        let state = store.state();
        if !state.selected_steps.is_empty() {
            let ids: Vec<StepId> = state.selected_steps.iter().copied().collect();
            store.dispatch(Action::RemoveSteps(ids))?;
        } else if let Some(key) = state.selected_connection {
            store.dispatch(Action::RemoveConnection(key))?;
        }
        Ok(())
    }

    /// Drops the in-progress gesture and any pending click deadline.
    pub fn teardown(&mut self) {
        if self.last_click.cancel().is_some() {
            debug!("Cancelled pending double-click deadline");
        }
        self.gesture = Gesture::Idle;
    }

    fn log_gesture(gesture: &Gesture) {
        debug!(?gesture, "Gesture started");
    }
}

impl Drop for InteractionController {
    fn drop(&mut self) {
        self.teardown();
    }
}
