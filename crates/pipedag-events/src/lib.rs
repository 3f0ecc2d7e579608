use crossbeam_channel::{Receiver, Sender, unbounded};
use pipedag_core::{ExecutionStatus, RunType, StepId};
use serde::{Deserialize, Serialize};

pub mod telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveStatus {
    Saving,
    Saved,
}

/// Outbound notifications from the editor and the persistence bridge.
///
/// Renderers and shells subscribe through the [`EventBus`]; nothing in here is
/// required for the graph itself to stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditorEvent {
    // Canvas
    StepOpened {
        id: Option<StepId>,
    },
    OpenNotebook {
        id: StepId,
    },
    OpenFilePreview {
        id: StepId,
    },
    CenterView,
    ZoomChanged {
        scale: f64,
    },

    // Runs
    RunRequested {
        steps: Vec<StepId>,
        run_type: RunType,
    },
    RunStarted {
        run_uuid: String,
    },
    RunStatusChanged {
        run_uuid: String,
        status: ExecutionStatus,
    },
    RunFinished {
        run_uuid: String,
        status: ExecutionStatus,
    },
    RunCancelled {
        run_uuid: String,
    },

    // Persistence
    PipelineLoaded {
        name: String,
        step_count: usize,
    },
    SaveStatusChanged(SaveStatus),
    ReadOnlyChanged {
        read_only: bool,
    },
    BuildRequested {
        project_uuid: String,
    },
    NavigateToJob {
        project_uuid: String,
        job_uuid: String,
    },

    // Notifications
    ShowInfo {
        title: String,
        message: String,
    },
    ShowWarning {
        message: String,
    },
    ShowError {
        title: String,
        message: String,
    },
}

impl EditorEvent {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShowError {
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<EditorEvent>,
    rx: Receiver<EditorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<EditorEvent> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<EditorEvent> {
        self.rx.clone()
    }

    pub fn publish(&self, event: EditorEvent) {
        tracing::trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    /// Dispatch all pending events to a listener.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }

    /// Takes every pending event.
    pub fn drain(&self) -> Vec<EditorEvent> {
        self.rx.try_iter().collect()
    }
}

/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &EditorEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_publish_receive() {
        let bus = EventBus::new();
        let receiver = bus.receiver();
        let id = StepId::from_u128(7);

        bus.publish(EditorEvent::OpenNotebook { id });

        match receiver.recv().unwrap() {
            EditorEvent::OpenNotebook { id: received } => assert_eq!(received, id),
            other => panic!("Expected OpenNotebook event, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_to_listener() {
        struct Collector(Vec<EditorEvent>);
        impl EventListener for Collector {
            fn handle_event(&mut self, event: &EditorEvent) {
                self.0.push(event.clone());
            }
        }

        let bus = EventBus::new();
        bus.publish(EditorEvent::CenterView);
        bus.publish(EditorEvent::SaveStatusChanged(SaveStatus::Saving));

        let mut collector = Collector(Vec::new());
        bus.dispatch_to(&mut collector);
        assert_eq!(
            collector.0,
            vec![
                EditorEvent::CenterView,
                EditorEvent::SaveStatusChanged(SaveStatus::Saving)
            ]
        );
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_clones_share_one_queue() {
        let bus = EventBus::new();
        let other = bus.clone();
        other.publish(EditorEvent::error("Error", "boom"));
        assert_eq!(bus.drain().len(), 1);
    }

    #[test]
    fn test_events_serialize() {
        let json = serde_json::to_string(&EditorEvent::ReadOnlyChanged { read_only: true }).unwrap();
        assert_eq!(json, r#"{"ReadOnlyChanged":{"read_only":true}}"#);
    }
}
