use crate::{StepId, Vec2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

impl Kernel {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Canvas placement. Only the editor reads it; the backend stores it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetaData {
    #[serde(default)]
    pub position: Vec2,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One node of the pipeline graph.
///
/// Edges live only on the destination, in `incoming_connections`. Fields the
/// editor does not understand are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub uuid: StepId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub kernel: Kernel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub incoming_connections: Vec<StepId>,
    #[serde(default)]
    pub meta_data: StepMetaData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    pub fn new(uuid: StepId, title: impl Into<String>) -> Self {
        Self {
            uuid,
            title: title.into(),
            file_path: String::new(),
            kernel: Kernel::default(),
            environment: None,
            parameters: Map::new(),
            incoming_connections: Vec::new(),
            meta_data: StepMetaData::default(),
            extra: Map::new(),
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.meta_data.position = position;
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_incoming(mut self, incoming: impl IntoIterator<Item = StepId>) -> Self {
        for id in incoming {
            self.add_incoming(id);
        }
        self
    }

    pub fn position(&self) -> Vec2 {
        self.meta_data.position
    }

    pub fn has_incoming(&self, id: StepId) -> bool {
        self.incoming_connections.contains(&id)
    }

    /// Appends `id` unless it is already present. Returns whether it was added.
    pub fn add_incoming(&mut self, id: StepId) -> bool {
        if self.has_incoming(id) {
            return false;
        }
        self.incoming_connections.push(id);
        true
    }

    /// Returns whether `id` was present.
    pub fn remove_incoming(&mut self, id: StepId) -> bool {
        let before = self.incoming_connections.len();
        self.incoming_connections.retain(|existing| *existing != id);
        before != self.incoming_connections.len()
    }
}
