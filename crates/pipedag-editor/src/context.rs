use crate::settings::EditorSettings;
use pipedag_events::EventBus;

/// Shared collaborators handed to the store-facing components at construction.
#[derive(Clone, Default)]
pub struct EditorContext {
    pub settings: EditorSettings,
    pub events: EventBus,
    /// Job/run views and pipelines failing the gate check are read-only.
    pub read_only: bool,
}

impl EditorContext {
    pub fn new(settings: EditorSettings, events: EventBus) -> Self {
        Self {
            settings,
            events,
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
