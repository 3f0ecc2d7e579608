use crate::input::Key;
use indexmap::IndexSet;
use pipedag_core::{
    Connection, ConnectionKey, DEFAULT_SCALE, Rect, StepId, StepMap, Vec2,
};
use std::collections::HashMap;

/// Rubber-band rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepSelector {
    pub anchor: Vec2,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub active: bool,
}

impl StepSelector {
    pub fn start(anchor: Vec2) -> Self {
        Self {
            anchor,
            x: anchor.x,
            y: anchor.y,
            width: 0.0,
            height: 0.0,
            active: true,
        }
    }

    /// Stretches the rectangle from the anchor to `current`, whichever way
    /// the pointer went.
    pub fn stretch_to(&mut self, current: Vec2) {
        let rect = Rect::from_corners(self.anchor, current);
        self.x = rect.min.x;
        self.y = rect.min.y;
        self.width = rect.width();
        self.height = rect.height();
    }

    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(Vec2::new(self.x, self.y), Vec2::new(self.width, self.height))
    }
}

/// Everything the canvas renders, owned by the [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub steps: StepMap,
    /// Derived from `steps`; rebuilt after every steps mutation.
    pub connections: Vec<Connection>,
    pub selected_steps: IndexSet<StepId>,
    pub selected_connection: Option<ConnectionKey>,
    pub opened_step: Option<StepId>,
    pub new_connection: Option<Connection>,
    pub step_selector: StepSelector,
    pub scale_factor: f64,
    pub keys_down: HashMap<Key, bool>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            steps: StepMap::new(),
            connections: Vec::new(),
            selected_steps: IndexSet::new(),
            selected_connection: None,
            opened_step: None,
            new_connection: None,
            step_selector: StepSelector::default(),
            scale_factor: DEFAULT_SCALE,
            keys_down: HashMap::new(),
        }
    }
}

impl EditorState {
    pub fn is_key_down(&self, key: Key) -> bool {
        self.keys_down.get(&key).copied().unwrap_or(false)
    }

    pub fn is_selected(&self, id: &StepId) -> bool {
        self.selected_steps.contains(id)
    }

    /// Steps whose position lies inside `rect` (inclusive), in document order.
    pub fn steps_in_rect(&self, rect: Rect) -> IndexSet<StepId> {
        self.steps
            .iter()
            .filter(|(_, step)| rect.contains(step.position()))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn connection(&self, key: &ConnectionKey) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|conn| conn.key().as_ref() == Some(key))
    }
}
