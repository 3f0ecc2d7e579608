use crate::{Step, StepId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Steps keyed by uuid, in document order.
pub type StepMap = IndexMap<StepId, Step>;

/// The persisted pipeline definition.
///
/// Only `steps` is edited on the canvas. Every other field, known or not, is
/// carried through a load/save cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub steps: StepMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineDocument {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Same document with the steps map replaced.
    pub fn with_steps(&self, steps: StepMap) -> Self {
        Self {
            steps,
            ..self.clone()
        }
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "name": "etl",
        "uuid": "pl-1",
        "version": "1.2",
        "steps": {
            "00000000-0000-0000-0000-000000000001": {
                "uuid": "00000000-0000-0000-0000-000000000001",
                "title": "extract",
                "kernel": {"name": "python", "display_name": "Python 3"},
                "incoming_connections": [],
                "meta_data": {"position": [0, 0], "hidden": false}
            },
            "00000000-0000-0000-0000-000000000002": {
                "uuid": "00000000-0000-0000-0000-000000000002",
                "title": "load",
                "kernel": {"name": "python", "display_name": "Python 3"},
                "incoming_connections": ["00000000-0000-0000-0000-000000000001"],
                "meta_data": {"position": [300, 40], "hidden": false}
            }
        },
        "services": {"redis": {"image": "redis"}},
        "settings": {"auto_eviction": true},
        "parameters": {}
    }"#;

    #[test]
    fn test_document_preserves_unrelated_metadata() {
        let doc = PipelineDocument::from_json(SAMPLE).unwrap();
        assert_eq!(doc.name, "etl");
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.extra.get("version"), Some(&json!("1.2")));

        let reparsed: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(reparsed["version"], json!("1.2"));
        assert_eq!(reparsed["services"]["redis"]["image"], json!("redis"));
        assert_eq!(reparsed["settings"]["auto_eviction"], json!(true));
    }

    #[test]
    fn test_with_steps_keeps_document_order() {
        let doc = PipelineDocument::from_json(SAMPLE).unwrap();
        let mut steps = doc.steps.clone();
        let first = *steps.keys().next().unwrap();
        if let Some(step) = steps.get_mut(&first) {
            step.meta_data.position = Vec2::new(5.0, 5.0);
        }

        let updated = doc.with_steps(steps);
        assert_eq!(updated.name, doc.name);
        assert_eq!(updated.step(&first).unwrap().position(), Vec2::new(5.0, 5.0));
        let titles: Vec<_> = updated.steps.values().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["extract", "load"]);
    }
}
