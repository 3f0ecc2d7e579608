use indexmap::IndexSet;
use pipedag_core::{PipelineDocument, StepId, StepMap, ValidationError};

/// Every problem found in a pipeline, in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineValidation {
    pub errors: Vec<ValidationError>,
}

impl PipelineValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The error shown to the user when a save is blocked.
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn validate_pipeline(document: &PipelineDocument) -> PipelineValidation {
    validate_steps(&document.steps)
}

pub fn validate_steps(steps: &StepMap) -> PipelineValidation {
    let mut errors = Vec::new();

    for (key, step) in steps {
        if *key != step.uuid {
            errors.push(ValidationError::KeyMismatch {
                key: *key,
                uuid: step.uuid,
            });
        }

        if step.kernel.name.trim().is_empty() {
            errors.push(ValidationError::MissingKernel {
                step: *key,
                title: step.title.clone(),
            });
        }

        errors.extend(incoming_errors(*key, &step.incoming_connections, steps));
    }

    if let Some(path) = find_cycle(steps) {
        tracing::debug!(length = path.len(), "Cycle detected in pipeline");
        errors.push(ValidationError::Cycle { path });
    }

    PipelineValidation { errors }
}

/// Edge problems of one step's incoming list: self-loops, repeated sources
/// and sources missing from `steps`. Each offending entry is reported once.
pub fn incoming_errors(step: StepId, incoming: &[StepId], steps: &StepMap) -> Vec<ValidationError> {
    let mut seen = IndexSet::with_capacity(incoming.len());
    let mut errors = Vec::new();
    for &source in incoming {
        if !seen.insert(source) {
            errors.push(ValidationError::DuplicateConnection {
                step,
                source_step: source,
            });
        } else if source == step {
            errors.push(ValidationError::SelfLoop(step));
        } else if !steps.contains_key(&source) {
            errors.push(ValidationError::DanglingConnection {
                step,
                missing: source,
            });
        }
    }
    errors
}

/// Finds a cycle through `incoming_connections`, ignoring self-loops and
/// references to missing steps.
///
/// Iterative DFS with an explicit recursion stack. The returned path lists the
/// cycle's steps in upstream order starting at the step where it was entered.
pub fn find_cycle(steps: &StepMap) -> Option<Vec<StepId>> {
    let mut finished: IndexSet<StepId> = IndexSet::new();

    for root in steps.keys() {
        if finished.contains(root) {
            continue;
        }

        // (step, index of the next incoming edge to follow)
        let mut stack: Vec<(StepId, usize)> = vec![(*root, 0)];
        let mut on_stack: IndexSet<StepId> = IndexSet::new();
        on_stack.insert(*root);

        while let Some((current, next)) = stack.last_mut() {
            let current = *current;
            let incoming = steps
                .get(&current)
                .map(|s| s.incoming_connections.as_slice())
                .unwrap_or_default();

            let Some(parent) = incoming.get(*next).copied() else {
                stack.pop();
                on_stack.shift_remove(&current);
                finished.insert(current);
                continue;
            };
            *next += 1;

            if parent == current || !steps.contains_key(&parent) || finished.contains(&parent) {
                continue;
            }

            if let Some(start) = on_stack.get_index_of(&parent) {
                return Some(on_stack.iter().skip(start).copied().collect());
            }

            on_stack.insert(parent);
            stack.push((parent, 0));
        }
    }

    None
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use pipedag_core::{Kernel, Step};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_forward_edges_never_form_cycles(
            edges in proptest::collection::vec((0usize..10, 0usize..10), 0..30)
        ) {
            let ids: Vec<StepId> = (0..10).map(|i| StepId::from_u128(i + 1)).collect();
            let mut graph: StepMap = ids
                .iter()
                .map(|id| (*id, Step::new(*id, "s").with_kernel(Kernel::new("python", "Python"))))
                .collect();
            for (a, b) in edges {
                if a < b
                    && let Some(step) = graph.get_mut(&ids[b])
                {
                    step.add_incoming(ids[a]);
                }
            }
            prop_assert!(find_cycle(&graph).is_none());

            // Closing any existing edge with a back edge creates a cycle.
            let edge = graph
                .values()
                .find_map(|s| s.incoming_connections.first().map(|p| (*p, s.uuid)));
            if let Some((parent, child)) = edge {
                if let Some(step) = graph.get_mut(&parent) {
                    step.add_incoming(child);
                }
                prop_assert!(find_cycle(&graph).is_some());
            }
        }
    }
}
