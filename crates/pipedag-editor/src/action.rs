use crate::input::Key;
use pipedag_core::{ConnectionKey, Step, StepId, StepMap, Vec2};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Every state transition of the editor store.
///
/// Pointer-derived variants carry the client position and the client position
/// of the canvas origin (`holder`); the store converts them with its own
/// scale factor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetSteps(StepMap),
    CreateStep(Step),
    RemoveSteps(Vec<StepId>),
    CreateConnectionInstance { start: StepId },
    MakeConnection { end: StepId },
    UpdateNewConnectionEndNode { client: Vec2, holder: Vec2 },
    CancelNewConnection,
    RemoveConnection(ConnectionKey),
    SelectConnection(ConnectionKey),
    DeselectConnection,
    SelectSteps(Vec<StepId>),
    DeselectSteps,
    ToggleStepSelection(StepId),
    SelectAllSteps,
    MoveSteps { ids: Vec<StepId>, delta: Vec2 },
    OnMouseDownCanvas { client: Vec2, holder: Vec2 },
    UpdateStepSelector { client: Vec2, holder: Vec2 },
    EndStepSelector,
    SetScaleFactor(f64),
    SetKeysDown(HashMap<Key, bool>),
    SaveStepDetails {
        uuid: StepId,
        changes: Map<String, Value>,
        replace: bool,
    },
    SetOpenedStep(Option<StepId>),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetSteps(_) => "SET_STEPS",
            Self::CreateStep(_) => "CREATE_STEP",
            Self::RemoveSteps(_) => "REMOVE_STEPS",
            Self::CreateConnectionInstance { .. } => "CREATE_CONNECTION_INSTANCE",
            Self::MakeConnection { .. } => "MAKE_CONNECTION",
            Self::UpdateNewConnectionEndNode { .. } => "UPDATE_NEW_CONNECTION_END_NODE",
            Self::CancelNewConnection => "CANCEL_NEW_CONNECTION",
            Self::RemoveConnection(_) => "REMOVE_CONNECTION",
            Self::SelectConnection(_) => "SELECT_CONNECTION",
            Self::DeselectConnection => "DESELECT_CONNECTION",
            Self::SelectSteps(_) => "SELECT_STEPS",
            Self::DeselectSteps => "DESELECT_STEPS",
            Self::ToggleStepSelection(_) => "TOGGLE_STEP_SELECTION",
            Self::SelectAllSteps => "SELECT_ALL_STEPS",
            Self::MoveSteps { .. } => "MOVE_STEPS",
            Self::OnMouseDownCanvas { .. } => "ON_MOUSE_DOWN_CANVAS",
            Self::UpdateStepSelector { .. } => "UPDATE_STEP_SELECTOR",
            Self::EndStepSelector => "END_STEP_SELECTOR",
            Self::SetScaleFactor(_) => "SET_SCALE_FACTOR",
            Self::SetKeysDown(_) => "SET_KEYS_DOWN",
            Self::SaveStepDetails { .. } => "SAVE_STEP_DETAILS",
            Self::SetOpenedStep(_) => "SET_OPENED_STEP",
        }
    }

    /// Actions that edit the pipeline itself, refused in read-only mode.
    pub fn edits_pipeline(&self) -> bool {
        matches!(
            self,
            Self::SetSteps(_)
                | Self::CreateStep(_)
                | Self::RemoveSteps(_)
                | Self::CreateConnectionInstance { .. }
                | Self::MakeConnection { .. }
                | Self::RemoveConnection(_)
                | Self::MoveSteps { .. }
                | Self::SaveStepDetails { .. }
        )
    }

    pub fn key_down(key: Key, down: bool) -> Self {
        Self::SetKeysDown(HashMap::from([(key, down)]))
    }
}
