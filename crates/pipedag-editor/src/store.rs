use crate::action::Action;
use crate::state::{EditorState, StepSelector};
use indexmap::IndexSet;
use pipedag_core::{
    Connection, ConnectionKey, Step, StepId, StepMap, Vec2, clamp_scale, derive_connections,
};
use pipedag_graph::{incoming_errors, scale_corrected_vec};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unknown step: {0}")]
    UnknownStep(StepId),
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionKey),
    #[error("No connection is being created")]
    NoPendingConnection,
    #[error("Invalid changes for step {uuid}: {reason}")]
    InvalidStepPatch { uuid: StepId, reason: String },
    #[error("The uuid of step {0} cannot be changed")]
    ImmutableUuid(StepId),
    #[error("The pipeline is read-only")]
    ReadOnly,
}

/// What an applied action touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing changed (duplicate edge, self-loop, no-op).
    None,
    /// Presentation only: selection, selector, scale, keys, positions mid-drag.
    View,
    /// Persisted graph content; the save token was bumped.
    Graph,
}

impl Change {
    pub fn is_graph(self) -> bool {
        self == Self::Graph
    }

    pub fn is_view(self) -> bool {
        self == Self::View
    }
}

/// Single owner of the editor state.
///
/// Every action is applied atomically: a rejected action leaves the state
/// untouched. After each graph change the connection list is rebuilt from the
/// steps map and the save token is bumped.
#[derive(Debug, Clone, Default)]
pub struct Store {
    state: EditorState,
    save_token: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: StepMap) -> Self {
        let mut store = Self::new();
        store.reset(steps);
        store
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn steps(&self) -> &StepMap {
        &self.state.steps
    }

    pub fn save_token(&self) -> u64 {
        self.save_token
    }

    /// Marks the graph dirty without changing it, e.g. at the end of a drag.
    pub fn request_save(&mut self) {
        self.save_token += 1;
    }

    /// Replaces the whole state with freshly fetched steps; does not trigger a save.
    pub fn reset(&mut self, steps: StepMap) {
        let scale_factor = self.state.scale_factor;
        self.state = EditorState {
            steps,
            scale_factor,
            ..EditorState::default()
        };
        self.sync_connections();
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Change, StoreError> {
        let name = action.name();
        let result = self.reduce(action);
        match &result {
            Ok(Change::Graph) => {
                self.sync_connections();
                self.save_token += 1;
                debug!(action = name, save_token = self.save_token, "Graph changed");
            }
            Ok(_) => {}
            Err(e) => warn!(action = name, error = %e, "Action rejected"),
        }
        result
    }

    fn reduce(&mut self, action: Action) -> Result<Change, StoreError> {
        match action {
            Action::SetSteps(steps) => {
                self.state.steps = steps;
                Ok(Change::Graph)
            }
            Action::CreateStep(step) => self.create_step(step),
            Action::RemoveSteps(ids) => Ok(self.remove_steps(&ids)),
            Action::CreateConnectionInstance { start } => {
                self.require_step(&start)?;
                self.state.new_connection = Some(Connection::pending(start));
                Ok(Change::View)
            }
            Action::MakeConnection { end } => self.make_connection(end),
            Action::UpdateNewConnectionEndNode { client, holder } => {
                let position = self.to_canvas(client, holder);
                let pending = self
                    .state
                    .new_connection
                    .as_mut()
                    .ok_or(StoreError::NoPendingConnection)?;
                pending.end_position = Some(position);
                Ok(Change::View)
            }
            Action::CancelNewConnection => Ok(match self.state.new_connection.take() {
                Some(_) => Change::View,
                None => Change::None,
            }),
            Action::RemoveConnection(key) => {
                let end = self
                    .state
                    .steps
                    .get_mut(&key.end)
                    .ok_or(StoreError::UnknownConnection(key))?;
                if !end.remove_incoming(key.start) {
                    return Err(StoreError::UnknownConnection(key));
                }
                Ok(Change::Graph)
            }
            Action::SelectConnection(key) => {
                if self.state.connection(&key).is_none() {
                    return Err(StoreError::UnknownConnection(key));
                }
                self.state.selected_connection = Some(key);
                self.refresh_connection_flags();
                Ok(Change::View)
            }
            Action::DeselectConnection => Ok(match self.state.selected_connection.take() {
                Some(_) => {
                    self.refresh_connection_flags();
                    Change::View
                }
                None => Change::None,
            }),
            Action::SelectSteps(ids) => {
                for id in &ids {
                    self.require_step(id)?;
                }
                self.state.selected_steps = ids.into_iter().collect();
                Ok(Change::View)
            }
            Action::DeselectSteps => Ok(self.set_selection(IndexSet::new())),
            Action::ToggleStepSelection(id) => {
                self.require_step(&id)?;
                if !self.state.selected_steps.shift_remove(&id) {
                    self.state.selected_steps.insert(id);
                }
                Ok(Change::View)
            }
            Action::SelectAllSteps => {
                let all = self.state.steps.keys().copied().collect();
                Ok(self.set_selection(all))
            }
            Action::MoveSteps { ids, delta } => {
                for id in &ids {
                    self.require_step(id)?;
                }
                if delta == Vec2::ZERO || ids.is_empty() {
                    return Ok(Change::None);
                }
                let unique: IndexSet<StepId> = ids.into_iter().collect();
                for id in unique {
                    if let Some(step) = self.state.steps.get_mut(&id) {
                        step.meta_data.position += delta;
                    }
                }
                Ok(Change::View)
            }
            Action::OnMouseDownCanvas { client, holder } => {
                let anchor = self.to_canvas(client, holder);
                self.state.step_selector = StepSelector::start(anchor);
                Ok(Change::View)
            }
            Action::UpdateStepSelector { client, holder } => {
                if !self.state.step_selector.active {
                    return Ok(Change::None);
                }
                let current = self.to_canvas(client, holder);
                self.state.step_selector.stretch_to(current);
                self.state.selected_steps =
                    self.state.steps_in_rect(self.state.step_selector.rect());
                Ok(Change::View)
            }
            Action::EndStepSelector => {
                if !self.state.step_selector.active {
                    return Ok(Change::None);
                }
                self.state.step_selector.active = false;
                Ok(Change::View)
            }
            Action::SetScaleFactor(scale) => {
                let scale = clamp_scale(scale);
                if scale == self.state.scale_factor {
                    return Ok(Change::None);
                }
                self.state.scale_factor = scale;
                Ok(Change::View)
            }
            Action::SetKeysDown(keys) => {
                self.state.keys_down.extend(keys);
                Ok(Change::View)
            }
            Action::SaveStepDetails {
                uuid,
                changes,
                replace,
            } => self.save_step_details(uuid, changes, replace),
            Action::SetOpenedStep(id) => {
                if let Some(id) = &id {
                    self.require_step(id)?;
                }
                if self.state.opened_step == id {
                    return Ok(Change::None);
                }
                self.state.opened_step = id;
                Ok(Change::View)
            }
        }
    }

    fn create_step(&mut self, mut step: Step) -> Result<Change, StoreError> {
        if self.state.steps.contains_key(&step.uuid) {
            warn!(uuid = %step.uuid, "Step uuid already exists; not creating");
            return Ok(Change::None);
        }
        step.incoming_connections.clear();
        self.state.steps.insert(step.uuid, step);
        Ok(Change::Graph)
    }

    fn remove_steps(&mut self, ids: &[StepId]) -> Change {
        let removed: IndexSet<StepId> = ids
            .iter()
            .filter(|id| self.state.steps.contains_key(*id))
            .copied()
            .collect();
        if removed.is_empty() {
            return Change::None;
        }

        self.state.steps.retain(|id, _| !removed.contains(id));
        for step in self.state.steps.values_mut() {
            step.incoming_connections.retain(|id| !removed.contains(id));
        }

        if self
            .state
            .new_connection
            .as_ref()
            .is_some_and(|conn| removed.contains(&conn.start))
        {
            self.state.new_connection = None;
        }
        debug!(count = removed.len(), "Removed steps");
        Change::Graph
    }

    fn make_connection(&mut self, end: StepId) -> Result<Change, StoreError> {
        let start = self
            .state
            .new_connection
            .as_ref()
            .ok_or(StoreError::NoPendingConnection)?
            .start;
        self.require_step(&end)?;
        self.state.new_connection = None;

        if start == end {
            debug!(step = %start, "Ignoring connection from a step to itself");
            return Ok(Change::View);
        }

        let Some(end_step) = self.state.steps.get_mut(&end) else {
            return Err(StoreError::UnknownStep(end));
        };
        if !end_step.add_incoming(start) {
            debug!(%start, %end, "Connection already exists");
            return Ok(Change::View);
        }
        Ok(Change::Graph)
    }

    fn save_step_details(
        &mut self,
        uuid: StepId,
        changes: Map<String, Value>,
        replace: bool,
    ) -> Result<Change, StoreError> {
        let current = self.require_step(&uuid)?;
        let invalid = |e: serde_json::Error| StoreError::InvalidStepPatch {
            uuid,
            reason: e.to_string(),
        };

        let mut value = serde_json::to_value(current).map_err(invalid)?;
        if replace {
            if let Value::Object(fields) = &mut value {
                fields.extend(changes);
            }
        } else {
            merge_json(&mut value, Value::Object(changes));
        }

        let updated: Step = serde_json::from_value(value).map_err(invalid)?;
        if updated.uuid != uuid {
            return Err(StoreError::ImmutableUuid(uuid));
        }
        if updated.incoming_connections != current.incoming_connections
            && let Some(err) =
                incoming_errors(uuid, &updated.incoming_connections, &self.state.steps)
                    .into_iter()
                    .next()
        {
            warn!(step = %uuid, error = %err, "Rejected step details with invalid connections");
            return Err(StoreError::InvalidStepPatch {
                uuid,
                reason: err.to_string(),
            });
        }
        if &updated == current {
            return Ok(Change::None);
        }
        self.state.steps.insert(uuid, updated);
        Ok(Change::Graph)
    }

    fn set_selection(&mut self, selection: IndexSet<StepId>) -> Change {
        if self.state.selected_steps == selection {
            return Change::None;
        }
        self.state.selected_steps = selection;
        Change::View
    }

    fn require_step(&self, id: &StepId) -> Result<&Step, StoreError> {
        self.state.steps.get(id).ok_or(StoreError::UnknownStep(*id))
    }

    fn to_canvas(&self, client: Vec2, holder: Vec2) -> Vec2 {
        scale_corrected_vec(client - holder, self.state.scale_factor)
    }

    /// Rebuilds derived data after a steps mutation.
    fn sync_connections(&mut self) {
        let steps = &self.state.steps;
        self.state.connections = derive_connections(steps);
        self.state.selected_steps.retain(|id| steps.contains_key(id));
        if self.state.opened_step.is_some_and(|id| !steps.contains_key(&id)) {
            self.state.opened_step = None;
        }
        if let Some(key) = self.state.selected_connection
            && self.state.connection(&key).is_none()
        {
            self.state.selected_connection = None;
        }
        self.refresh_connection_flags();
    }

    fn refresh_connection_flags(&mut self) {
        let selected = self.state.selected_connection;
        for conn in &mut self.state.connections {
            conn.selected = conn.key().is_some() && conn.key() == selected;
        }
    }
}

/// Recursively merges `patch` into `target`: objects merge key by key,
/// anything else is overwritten.
fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_store() -> impl Strategy<Value = (Store, Vec<Vec<usize>>)> {
        (2usize..10).prop_flat_map(|n| {
            (
                proptest::collection::vec((0..n, 0..n), 0..(n * 3)),
                proptest::collection::vec(proptest::collection::vec(0..n, 0..4), 1..5),
            )
                .prop_map(move |(edges, removals)| {
                    let ids: Vec<StepId> =
                        (0..n).map(|i| StepId::from_u128(i as u128 + 1)).collect();
                    let mut store = Store::new();
                    for step_id in &ids {
                        let _ = store.dispatch(Action::CreateStep(Step::new(*step_id, "s")));
                    }
                    for (a, b) in edges {
                        let _ = store.dispatch(Action::CreateConnectionInstance { start: ids[a] });
                        let _ = store.dispatch(Action::MakeConnection { end: ids[b] });
                    }
                    (store, removals)
                })
        })
    }

    proptest! {
        #[test]
        fn prop_removals_never_leave_dangling_edges((mut store, removals) in arb_store()) {
            let mut removed = IndexSet::new();
            for batch in removals {
                let ids: Vec<StepId> =
                    batch.iter().map(|i| StepId::from_u128(*i as u128 + 1)).collect();
                removed.extend(ids.iter().copied());
                store.dispatch(Action::RemoveSteps(ids)).unwrap();

                for step in store.steps().values() {
                    for incoming in &step.incoming_connections {
                        prop_assert!(!removed.contains(incoming));
                        prop_assert!(store.steps().contains_key(incoming));
                    }
                }
                prop_assert_eq!(
                    &store.state().connections,
                    &derive_connections(store.steps())
                );
            }
        }

        #[test]
        fn prop_no_self_loops_or_duplicates((store, _) in arb_store()) {
            for (id, step) in store.steps() {
                prop_assert!(!step.incoming_connections.contains(id));
                let unique: IndexSet<_> = step.incoming_connections.iter().collect();
                prop_assert_eq!(unique.len(), step.incoming_connections.len());
            }
        }
    }
}
