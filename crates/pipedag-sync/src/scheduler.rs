use pipedag_core::{RunType, StepId};

/// A run waiting for the save that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRun {
    pub steps: Vec<StepId>,
    pub run_type: RunType,
}

/// What one save attempt covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub token: u64,
    pub run: Option<PendingRun>,
}

/// Decides when the editor's save token calls for a write.
///
/// Saves are not queued: every due check that passes starts its own write,
/// and a pending run rides on the next one.
#[derive(Debug, Clone, Default)]
pub struct SaveScheduler {
    last_saved: u64,
    pending_run: Option<PendingRun>,
}

impl SaveScheduler {
    /// `token` is the store's token right after the document was loaded.
    pub fn new(token: u64) -> Self {
        Self {
            last_saved: token,
            pending_run: None,
        }
    }

    pub fn is_due(&self, token: u64) -> bool {
        token != self.last_saved || self.pending_run.is_some()
    }

    /// Replaces any run that has not been issued yet.
    pub fn attach_run(&mut self, steps: Vec<StepId>, run_type: RunType) {
        self.pending_run = Some(PendingRun { steps, run_type });
    }

    pub fn pending_run(&self) -> Option<&PendingRun> {
        self.pending_run.as_ref()
    }

    pub fn begin(&mut self, token: u64) -> SaveTicket {
        self.last_saved = token;
        SaveTicket {
            token,
            run: self.pending_run.take(),
        }
    }

    pub fn last_saved(&self) -> u64 {
        self.last_saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_only_when_token_moves() {
        let mut scheduler = SaveScheduler::new(3);
        assert!(!scheduler.is_due(3));
        assert!(scheduler.is_due(4));

        let ticket = scheduler.begin(4);
        assert_eq!(ticket.token, 4);
        assert_eq!(ticket.run, None);
        assert!(!scheduler.is_due(4));
    }

    #[test]
    fn test_pending_run_forces_a_save_and_is_taken_once() {
        let mut scheduler = SaveScheduler::new(0);
        scheduler.attach_run(vec![StepId::from_u128(1)], RunType::Selection);
        assert!(scheduler.is_due(0));

        let ticket = scheduler.begin(0);
        assert_eq!(
            ticket.run,
            Some(PendingRun {
                steps: vec![StepId::from_u128(1)],
                run_type: RunType::Selection
            })
        );
        assert!(scheduler.pending_run().is_none());
        assert!(!scheduler.is_due(0));
    }
}
