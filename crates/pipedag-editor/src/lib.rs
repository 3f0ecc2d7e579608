pub mod action;
pub mod context;
pub mod controller;
pub mod input;
pub mod session;
pub mod settings;
pub mod state;
pub mod store;
pub mod timers;

pub use action::Action;
pub use context::EditorContext;
pub use controller::{CanvasParts, Gesture, InteractionController, PointerAffordance};
pub use input::{Key, KeyEvent, Modifiers, PointerButton, PointerEvent, WheelDeltaMode, WheelEvent};
pub use session::{ConnectionEndpoints, EditorSession, IncomingStep};
pub use settings::{
    CanvasSettings, EditorSettings, InteractionSettings, LayoutSettings, SettingsError,
    SyncSettings,
};
pub use state::{EditorState, StepSelector};
pub use store::{Change, Store, StoreError};
pub use timers::DeadlineSlot;
