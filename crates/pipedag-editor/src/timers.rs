use std::time::Instant;

/// A value that stays pending until a deadline passes.
///
/// Nothing fires on its own: owners check the slot with the current time when
/// they next handle an event.
#[derive(Debug, Clone)]
pub struct DeadlineSlot<T> {
    pending: Option<(T, Instant)>,
}

impl<T> Default for DeadlineSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> DeadlineSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the slot, replacing any pending value.
    pub fn arm(&mut self, value: T, deadline: Instant) {
        self.pending = Some((value, deadline));
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    /// The pending value if its deadline has not passed yet.
    pub fn live(&self, now: Instant) -> Option<&T> {
        match &self.pending {
            Some((value, deadline)) if now < *deadline => Some(value),
            _ => None,
        }
    }

    /// Takes the value once its deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if now >= *deadline => self.cancel(),
            _ => None,
        }
    }
}
