//! Session-within-cycle bookkeeping.

use serde::{Deserialize, Serialize};

/// Tracks "session N of M" and decides when a long rest is due.
///
/// `current_session_number` is 1-based; `sessions_completed` counts work
/// phases finished since the last long rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounter {
    cycle_length: u32,
    current_session_number: u32,
    sessions_completed: u32,
}

impl CycleCounter {
    pub fn new(cycle_length: u32) -> Self {
        Self {
            cycle_length: cycle_length.max(1),
            current_session_number: 1,
            sessions_completed: 0,
        }
    }

    /// Rebuild a counter from persisted values.
    pub fn from_parts(cycle_length: u32, current_session_number: u32, sessions_completed: u32) -> Self {
        Self {
            cycle_length: cycle_length.max(1),
            current_session_number: current_session_number.max(1),
            sessions_completed,
        }
    }

    pub fn cycle_length(&self) -> u32 {
        self.cycle_length
    }

    pub fn current_session_number(&self) -> u32 {
        self.current_session_number
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    pub fn complete_session(&mut self) {
        self.sessions_completed = self.sessions_completed.saturating_add(1);
    }

    pub fn prepare_next_session(&mut self) {
        self.current_session_number = self.current_session_number.saturating_add(1);
    }

    pub fn start_new_cycle(&mut self) {
        self.current_session_number = 1;
        self.sessions_completed = 0;
    }

    pub fn should_take_long_break(&self) -> bool {
        self.sessions_completed >= self.cycle_length
    }

    /// Change the long-rest threshold. Progress is kept.
    pub fn update_cycle_length(&mut self, cycle_length: u32) {
        self.cycle_length = cycle_length.max(1);
    }
}

impl Default for CycleCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_break_after_cycle_length_sessions() {
        let mut counter = CycleCounter::new(3);
        for _ in 0..2 {
            counter.complete_session();
            assert!(!counter.should_take_long_break());
            counter.prepare_next_session();
        }
        counter.complete_session();
        assert!(counter.should_take_long_break());
        assert_eq!(counter.current_session_number(), 3);
    }

    #[test]
    fn new_cycle_resets_both_counters() {
        let mut counter = CycleCounter::new(2);
        counter.complete_session();
        counter.prepare_next_session();
        counter.complete_session();
        counter.start_new_cycle();
        assert_eq!(counter.current_session_number(), 1);
        assert_eq!(counter.sessions_completed(), 0);
    }

    #[test]
    fn update_cycle_length_keeps_progress() {
        let mut counter = CycleCounter::new(4);
        counter.complete_session();
        counter.complete_session();
        counter.update_cycle_length(2);
        assert_eq!(counter.sessions_completed(), 2);
        assert!(counter.should_take_long_break());
    }

    #[test]
    fn zero_cycle_length_is_treated_as_one() {
        let mut counter = CycleCounter::new(0);
        assert_eq!(counter.cycle_length(), 1);
        counter.complete_session();
        assert!(counter.should_take_long_break());
    }
}
