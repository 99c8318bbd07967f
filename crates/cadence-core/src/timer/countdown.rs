//! Deadline-based countdown primitive.
//!
//! The timer stores an absolute deadline while running and a frozen
//! remainder while paused, so suspension of the host process never causes
//! drift. It has no thread of its own: the owner polls it with the current
//! time and reacts to the returned [`TimerUpdate`].
//!
//! Every `start`, `stop` and `restore_paused` bumps the generation. Ticks
//! produced by a driver for an older generation are stale and must be
//! ignored by the owner.

use chrono::{DateTime, Duration, Utc};

use crate::clock::ms_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerUpdate {
    /// Periodic update with the time left.
    Tick { remaining_ms: u64 },
    /// The countdown reached zero. Produced once per start.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownState {
    Stopped,
    Running { deadline: DateTime<Utc> },
    Paused { remaining_ms: u64 },
    Finished,
}

#[derive(Debug, Clone)]
pub struct PhaseTimer {
    generation: u64,
    duration_ms: u64,
    state: CountdownState,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            generation: 0,
            duration_ms: 0,
            state: CountdownState::Stopped,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CountdownState::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, CountdownState::Paused { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, CountdownState::Stopped)
    }

    /// Begin a countdown of `duration_ms`, replacing any previous one.
    pub fn start(&mut self, duration_ms: u64, now: DateTime<Utc>) -> u64 {
        self.generation += 1;
        self.duration_ms = duration_ms;
        self.state = CountdownState::Running {
            deadline: deadline_after(now, duration_ms),
        };
        self.generation
    }

    /// Freeze the remainder. Returns false unless running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CountdownState::Running { deadline } => {
                self.state = CountdownState::Paused {
                    remaining_ms: ms_between(now, deadline),
                };
                true
            }
            _ => false,
        }
    }

    /// Continue from the frozen remainder. Returns false unless paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CountdownState::Paused { remaining_ms } => {
                self.state = CountdownState::Running {
                    deadline: deadline_after(now, remaining_ms),
                };
                true
            }
            _ => false,
        }
    }

    /// Cancel the countdown. Idempotent; a stopped timer never reports again.
    pub fn stop(&mut self) {
        if self.state != CountdownState::Stopped {
            self.generation += 1;
            self.state = CountdownState::Stopped;
        }
    }

    /// Arm the timer in the paused state, as when rehydrating a snapshot.
    pub fn restore_paused(&mut self, duration_ms: u64, remaining_ms: u64) -> u64 {
        self.generation += 1;
        self.duration_ms = duration_ms;
        self.state = CountdownState::Paused {
            remaining_ms: remaining_ms.min(duration_ms),
        };
        self.generation
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.state {
            CountdownState::Stopped | CountdownState::Finished => 0,
            CountdownState::Running { deadline } => ms_between(now, deadline),
            CountdownState::Paused { remaining_ms } => remaining_ms,
        }
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<TimerUpdate> {
        match self.state {
            CountdownState::Running { deadline } => {
                let remaining_ms = ms_between(now, deadline);
                if remaining_ms == 0 {
                    self.state = CountdownState::Finished;
                    Some(TimerUpdate::Completed)
                } else {
                    Some(TimerUpdate::Tick { remaining_ms })
                }
            }
            _ => None,
        }
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// `now + ms`, pinned to the latest representable instant on overflow.
fn deadline_after(now: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Duration::try_milliseconds(ms)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn ticks_then_completes_once() {
        let mut timer = PhaseTimer::new();
        timer.start(3_000, t0());
        assert_eq!(
            timer.poll(t0() + Duration::seconds(1)),
            Some(TimerUpdate::Tick { remaining_ms: 2_000 })
        );
        assert_eq!(timer.poll(t0() + Duration::seconds(3)), Some(TimerUpdate::Completed));
        assert_eq!(timer.poll(t0() + Duration::seconds(4)), None);
        assert_eq!(timer.remaining_ms(t0() + Duration::seconds(4)), 0);
    }

    #[test]
    fn pause_freezes_remaining() {
        let mut timer = PhaseTimer::new();
        timer.start(600_000, t0());
        assert!(timer.pause(t0() + Duration::seconds(100)));
        let later = t0() + Duration::hours(5);
        assert_eq!(timer.remaining_ms(later), 500_000);
        assert_eq!(timer.poll(later), None);
        assert!(timer.resume(later));
        assert_eq!(timer.remaining_ms(later + Duration::seconds(10)), 490_000);
    }

    #[test]
    fn repeated_pause_resume_does_not_drift() {
        let mut timer = PhaseTimer::new();
        let mut now = t0();
        timer.start(60_000, now);
        for _ in 0..20 {
            now += Duration::milliseconds(700);
            timer.pause(now);
            now += Duration::seconds(30);
            timer.resume(now);
        }
        assert_eq!(timer.remaining_ms(now), 60_000 - 20 * 700);
    }

    #[test]
    fn stop_is_idempotent_and_bumps_generation_once() {
        let mut timer = PhaseTimer::new();
        let gen = timer.start(1_000, t0());
        timer.stop();
        assert_eq!(timer.generation(), gen + 1);
        timer.stop();
        assert_eq!(timer.generation(), gen + 1);
        assert_eq!(timer.poll(t0() + Duration::seconds(2)), None);
    }

    #[test]
    fn invalid_transitions_report_false() {
        let mut timer = PhaseTimer::new();
        assert!(!timer.pause(t0()));
        assert!(!timer.resume(t0()));
        timer.start(1_000, t0());
        assert!(!timer.resume(t0()));
        assert!(timer.pause(t0()));
        assert!(!timer.pause(t0()));
    }

    #[test]
    fn zero_duration_completes_on_first_poll() {
        let mut timer = PhaseTimer::new();
        timer.start(0, t0());
        assert_eq!(timer.poll(t0()), Some(TimerUpdate::Completed));
    }

    #[test]
    fn huge_duration_saturates_instead_of_overflowing() {
        let mut timer = PhaseTimer::new();
        timer.start(u64::MAX, t0());
        assert!(timer.is_running());
        assert!(timer.remaining_ms(t0()) > 0);
        assert!(matches!(timer.poll(t0()), Some(TimerUpdate::Tick { .. })));
        assert!(timer.pause(t0() + Duration::seconds(1)));
        assert!(timer.resume(t0() + Duration::seconds(2)));
    }
}
