use crate::{StepId, Vec2, document::StepMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an established edge: `start` feeds into `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub start: StepId,
    pub end: StepId,
}

impl ConnectionKey {
    pub fn new(start: StepId, end: StepId) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}

/// Editor-side view of an edge.
///
/// `end` is `None` while the user is still dragging out a new connection; the
/// floating tip then lives in `end_position` (canvas coordinates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub start: StepId,
    pub end: Option<StepId>,
    pub selected: bool,
    pub end_position: Option<Vec2>,
}

impl Connection {
    pub fn pending(start: StepId) -> Self {
        Self {
            start,
            end: None,
            selected: false,
            end_position: None,
        }
    }

    pub fn established(start: StepId, end: StepId) -> Self {
        Self {
            start,
            end: Some(end),
            selected: false,
            end_position: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.end.is_none()
    }

    pub fn key(&self) -> Option<ConnectionKey> {
        self.end.map(|end| ConnectionKey::new(self.start, end))
    }
}

/// Builds the connection list implied by the steps map.
///
/// Order follows the steps map, then each step's incoming list. References to
/// steps that are not in the map are skipped.
pub fn derive_connections(steps: &StepMap) -> Vec<Connection> {
    let mut connections = Vec::new();
    for (end, step) in steps {
        for start in &step.incoming_connections {
            if steps.contains_key(start) {
                connections.push(Connection::established(*start, *end));
            }
        }
    }
    connections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Step;

    #[test]
    fn test_derive_connections_follows_incoming_lists() {
        let a = StepId::from_u128(1);
        let b = StepId::from_u128(2);
        let c = StepId::from_u128(3);
        let ghost = StepId::from_u128(99);

        let mut steps = StepMap::new();
        steps.insert(a, Step::new(a, "a"));
        steps.insert(b, Step::new(b, "b").with_incoming([a]));
        steps.insert(c, Step::new(c, "c").with_incoming([a, b, ghost]));

        let keys: Vec<_> = derive_connections(&steps)
            .iter()
            .filter_map(Connection::key)
            .collect();
        assert_eq!(
            keys,
            vec![
                ConnectionKey::new(a, b),
                ConnectionKey::new(a, c),
                ConnectionKey::new(b, c)
            ]
        );
    }

    #[test]
    fn test_pending_connection_has_no_key() {
        let conn = Connection::pending(StepId::from_u128(1));
        assert!(conn.is_pending());
        assert!(conn.key().is_none());
    }
}
