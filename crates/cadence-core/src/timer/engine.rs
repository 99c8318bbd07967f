//! Session engine implementation.
//!
//! The engine is a wall-clock-based state machine over a [`PhaseSequence`].
//! It does not use internal threads - the owner calls `tick()` (or feeds it
//! [`TimerSignal`]s from a driver) and the engine advances when the current
//! phase's deadline has passed.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> [Preparing] -> Working -> Resting(short) -> Working -> ...
//!                        Working -> Resting(long)  -> Working (new cycle)
//!                        Working -> Completed      (final round of a finite sequence)
//! any  -> stop() -> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = SessionEngine::new(PhaseSequence::default());
//! engine.start();
//! // In a loop:
//! let events = engine.tick();
//! ```
//!
//! Commands never fail loudly. An operation that does not fit the current
//! phase returns no events, leaves every field untouched, logs a warning
//! and is remembered in [`SessionEngine::last_rejection`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::countdown::{PhaseTimer, TimerUpdate};
use super::cycle::CycleCounter;
use super::phase::{Phase, RestKind};
use super::sequence::PhaseSequence;
use crate::clock::{ms_between, Clock, SystemClock};
use crate::error::EngineError;
use crate::events::{EngineStatus, Event};
use crate::feedback::{FeedbackCue, FeedbackHub};
use crate::recovery::RecoverySnapshot;
use crate::storage::config::SessionConfig;

/// Periodic wake-up for the engine, tagged with the timer generation it
/// was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSignal {
    pub generation: u64,
}

/// Wall-clock bookkeeping for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTiming {
    pub session_start: Option<DateTime<Utc>>,
    pub total_paused_ms: u64,
    pub pause_started: Option<DateTime<Utc>>,
    /// Set when the run reaches `Completed`; freezes elapsed time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunTiming {
    fn started(at: DateTime<Utc>) -> Self {
        Self {
            session_start: Some(at),
            ..Self::default()
        }
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.pause_started.take() {
            self.total_paused_ms = self.total_paused_ms.saturating_add(ms_between(since, now));
        }
    }

    /// `now - start - paused`, never counting an open pause.
    pub fn elapsed_active_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        let start = self.session_start?;
        let end = self.finished_at.unwrap_or(now);
        let open_pause = self.pause_started.map(|p| ms_between(p, end)).unwrap_or(0);
        let paused = self.total_paused_ms.saturating_add(open_pause);
        Some(ms_between(start, end).saturating_sub(paused))
    }
}

pub struct SessionEngine {
    sequence: PhaseSequence,
    pending_sequence: Option<PhaseSequence>,
    phase: Phase,
    timer: PhaseTimer,
    cycle: CycleCounter,
    round: u32,
    timing: RunTiming,
    run_id: Option<Uuid>,
    phase_started_at: Option<DateTime<Utc>>,
    last_countdown_second: Option<u64>,
    clock: Arc<dyn Clock>,
    feedback: FeedbackHub,
    last_rejection: Option<EngineError>,
}

impl SessionEngine {
    /// Create an idle engine over `sequence` with the system clock and no feedback.
    pub fn new(sequence: PhaseSequence) -> Self {
        let cycle = CycleCounter::new(sequence.cycle_length());
        Self {
            sequence,
            pending_sequence: None,
            phase: Phase::Idle,
            timer: PhaseTimer::new(),
            cycle,
            round: 1,
            timing: RunTiming::default(),
            run_id: None,
            phase_started_at: None,
            last_countdown_second: None,
            clock: Arc::new(SystemClock),
            feedback: FeedbackHub::silent(),
            last_rejection: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackHub) -> Self {
        self.feedback = feedback;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.phase.is_timed() && self.timer.is_paused()
    }

    pub fn time_remaining_ms(&self) -> u64 {
        if self.phase.is_timed() {
            self.timer.remaining_ms(self.clock.now())
        } else {
            0
        }
    }

    pub fn phase_duration_ms(&self) -> u64 {
        if self.phase.is_timed() {
            self.timer.duration_ms()
        } else {
            0
        }
    }

    /// 0.0 .. 1.0 through the current phase; 0 outside timed phases.
    pub fn progress(&self) -> f64 {
        let total = self.phase_duration_ms();
        if total == 0 {
            return 0.0;
        }
        (1.0 - self.time_remaining_ms() as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub fn current_session_number(&self) -> u32 {
        self.cycle.current_session_number()
    }

    pub fn sessions_completed_in_cycle(&self) -> u32 {
        self.cycle.sessions_completed()
    }

    pub fn cycle_length(&self) -> u32 {
        self.cycle.cycle_length()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Active time of the current run, net of pauses. `None` before a run starts.
    pub fn current_session_duration_ms(&self) -> Option<u64> {
        self.timing.elapsed_active_ms(self.clock.now())
    }

    pub fn session_start_time(&self) -> Option<DateTime<Utc>> {
        self.timing.session_start
    }

    pub fn timing(&self) -> &RunTiming {
        &self.timing
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn sequence(&self) -> &PhaseSequence {
        &self.sequence
    }

    /// A configuration change waiting for the run to end.
    pub fn pending_sequence(&self) -> Option<&PhaseSequence> {
        self.pending_sequence.as_ref()
    }

    pub fn current_label(&self) -> String {
        self.sequence.label(self.phase, self.cycle.current_session_number())
    }

    pub fn timer_generation(&self) -> u64 {
        self.timer.generation()
    }

    /// Whether the countdown is live and needs ticks.
    pub fn is_timer_running(&self) -> bool {
        self.phase.is_timed() && self.timer.is_running()
    }

    pub fn last_rejection(&self) -> Option<&EngineError> {
        self.last_rejection.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            label: self.current_label(),
            is_paused: self.is_paused(),
            time_remaining_ms: self.time_remaining_ms(),
            phase_duration_ms: self.phase_duration_ms(),
            progress: self.progress(),
            current_session_number: self.current_session_number(),
            sessions_completed_in_cycle: self.sessions_completed_in_cycle(),
            cycle_length: self.cycle_length(),
            round: self.round,
            current_session_duration_ms: self.current_session_duration_ms(),
            sequence: self.sequence.name.clone(),
            at: self.clock.now(),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot(self.status())
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Vec<Event> {
        if !self.phase.is_terminal() {
            self.reject(EngineError::AlreadyInProgress { phase: self.phase });
            return Vec::new();
        }
        let now = self.clock.now();
        let mut events = Vec::new();
        events.extend(self.apply_pending(now));
        self.timer.stop();
        self.cycle = CycleCounter::new(self.sequence.cycle_length());
        self.round = 1;
        self.timing = RunTiming::started(now);
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        tracing::info!(%run_id, sequence = %self.sequence.name, "run started");
        events.push(Event::RunStarted {
            run_id,
            sequence: self.sequence.name.clone(),
            at: now,
        });
        events.extend(self.enter(Phase::Preparing, now));
        events
    }

    pub fn pause(&mut self) -> Vec<Event> {
        if !self.phase.is_timed() || self.is_paused() {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "pause",
                phase: self.phase,
            });
            return Vec::new();
        }
        let now = self.clock.now();
        self.timer.pause(now);
        self.timing.pause_started = Some(now);
        tracing::debug!(phase = %self.phase, "paused");
        vec![Event::Paused {
            phase: self.phase,
            remaining_ms: self.timer.remaining_ms(now),
            at: now,
        }]
    }

    pub fn resume(&mut self) -> Vec<Event> {
        if !self.is_paused() {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "resume",
                phase: self.phase,
            });
            return Vec::new();
        }
        let now = self.clock.now();
        self.timer.resume(now);
        self.timing.close_pause(now);
        tracing::debug!(phase = %self.phase, "resumed");
        vec![Event::Resumed {
            phase: self.phase,
            remaining_ms: self.timer.remaining_ms(now),
            at: now,
        }]
    }

    /// Abandon the run. Counters, timing and the timer are cleared.
    pub fn stop(&mut self) -> Vec<Event> {
        if self.phase == Phase::Idle {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "stop",
                phase: self.phase,
            });
            return Vec::new();
        }
        let now = self.clock.now();
        let stopped = Event::RunStopped {
            run_id: self.run_id,
            sequence: self.sequence.name.clone(),
            started_at: self.timing.session_start,
            elapsed_active_ms: self.timing.elapsed_active_ms(now).unwrap_or(0),
            at: now,
        };
        tracing::info!(run_id = ?self.run_id, phase = %self.phase, "run stopped");
        self.clear_run();
        let mut events = vec![stopped];
        events.extend(self.apply_pending(now));
        events
    }

    /// Return to idle from any phase, including idle itself.
    pub fn reset(&mut self) -> Vec<Event> {
        let now = self.clock.now();
        self.clear_run();
        self.last_rejection = None;
        let mut events = vec![Event::EngineReset { at: now }];
        events.extend(self.apply_pending(now));
        events
    }

    /// Finish the current timed phase now, as if its timer had run out.
    pub fn skip(&mut self) -> Vec<Event> {
        if !self.phase.is_timed() {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "skip",
                phase: self.phase,
            });
            return Vec::new();
        }
        let now = self.clock.now();
        self.finish_phase(true, now)
    }

    pub fn skip_prep(&mut self) -> Vec<Event> {
        if self.phase != Phase::Preparing {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "skip prep",
                phase: self.phase,
            });
            return Vec::new();
        }
        self.skip()
    }

    pub fn skip_rest(&mut self) -> Vec<Event> {
        if !self.phase.is_rest() {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "skip rest",
                phase: self.phase,
            });
            return Vec::new();
        }
        self.skip()
    }

    /// Focus-timer name for [`skip_rest`](Self::skip_rest).
    pub fn skip_break(&mut self) -> Vec<Event> {
        self.skip_rest()
    }

    /// Replace the sequence. Applied at once when idle or completed,
    /// otherwise held until the run returns to one of those.
    ///
    /// A sequence that fails [`PhaseSequence::validate`] is refused.
    pub fn configure(&mut self, sequence: PhaseSequence) -> Vec<Event> {
        if let Err(e) = sequence.validate() {
            self.reject(EngineError::InvalidSequence(e.to_string()));
            return Vec::new();
        }
        let now = self.clock.now();
        if self.phase.is_terminal() {
            self.pending_sequence = Some(sequence);
            return self.apply_pending(now);
        }
        tracing::info!(sequence = %sequence.name, phase = %self.phase, "configuration deferred until run ends");
        let name = sequence.name.clone();
        self.pending_sequence = Some(sequence);
        vec![Event::ConfigurationDeferred {
            sequence: name,
            at: now,
        }]
    }

    /// Configure focus durations. Values are clamped first.
    pub fn configure_durations(&mut self, config: &SessionConfig) -> Vec<Event> {
        self.configure(PhaseSequence::focus(config))
    }

    /// Change the long-rest threshold without touching progress.
    pub fn update_cycle_length(&mut self, cycle_length: u32) {
        self.cycle.update_cycle_length(cycle_length);
    }

    /// Call periodically. Returns the events produced since the last call.
    pub fn tick(&mut self) -> Vec<Event> {
        let now = self.clock.now();
        match self.timer.poll(now) {
            None => Vec::new(),
            Some(TimerUpdate::Tick { remaining_ms }) => {
                self.countdown_cue(remaining_ms);
                vec![Event::Tick {
                    phase: self.phase,
                    remaining_ms,
                    progress: self.progress(),
                    at: now,
                }]
            }
            Some(TimerUpdate::Completed) => self.finish_phase(false, now),
        }
    }

    /// Tick on behalf of a driver. Signals for a replaced timer are dropped.
    pub fn handle_signal(&mut self, signal: TimerSignal) -> Vec<Event> {
        if signal.generation != self.timer.generation() {
            tracing::trace!(
                stale = signal.generation,
                current = self.timer.generation(),
                "dropping stale timer signal"
            );
            return Vec::new();
        }
        self.tick()
    }

    // ── Recovery ─────────────────────────────────────────────────────

    /// Capture the run for later restoration. `None` when there is no run
    /// worth restoring.
    pub fn capture_snapshot(&self) -> Option<RecoverySnapshot> {
        if !self.phase.is_timed() {
            return None;
        }
        let now = self.clock.now();
        Some(RecoverySnapshot {
            version: RecoverySnapshot::VERSION,
            run_id: self.run_id,
            sequence: self.sequence.clone(),
            phase: self.phase,
            paused: self.is_paused(),
            time_remaining_ms: self.timer.remaining_ms(now),
            phase_duration_ms: self.timer.duration_ms(),
            session_start_time: self.timing.session_start.unwrap_or(now),
            total_paused_ms: self.timing.total_paused_ms,
            pause_started_at: self.timing.pause_started,
            current_session_number: self.cycle.current_session_number(),
            sessions_completed_in_cycle: self.cycle.sessions_completed(),
            cycle_length: Some(self.cycle.cycle_length()),
            round: self.round,
            captured_at: now,
        })
    }

    /// Load a snapshot into an idle engine. The phase comes back paused;
    /// the caller decides when to `resume()`.
    ///
    /// Staleness is the caller's concern (see `RecoveryManager`).
    pub fn rehydrate(&mut self, snapshot: RecoverySnapshot) -> Vec<Event> {
        if !self.phase.is_terminal() {
            self.reject(EngineError::AlreadyInProgress { phase: self.phase });
            return Vec::new();
        }
        if !snapshot.phase.is_timed() {
            self.reject(EngineError::InvalidPhaseForOperation {
                operation: "restore",
                phase: snapshot.phase,
            });
            return Vec::new();
        }
        if let Err(e) = snapshot.sequence.validate() {
            self.reject(EngineError::InvalidSequence(e.to_string()));
            return Vec::new();
        }
        let now = self.clock.now();
        let planned_ms = snapshot
            .sequence
            .duration_ms(snapshot.phase, snapshot.current_session_number);
        self.cycle = CycleCounter::from_parts(
            snapshot.cycle_length.unwrap_or_else(|| snapshot.sequence.cycle_length()),
            snapshot.current_session_number,
            snapshot.sessions_completed_in_cycle,
        );
        self.sequence = snapshot.sequence;
        self.phase = snapshot.phase;
        self.round = snapshot.round.max(1);
        self.run_id = snapshot.run_id;
        self.timing = RunTiming {
            session_start: Some(snapshot.session_start_time),
            total_paused_ms: snapshot.total_paused_ms,
            // Time spent away counts as paused.
            pause_started: Some(snapshot.pause_started_at.unwrap_or(snapshot.captured_at)),
            finished_at: None,
        };
        self.timer.restore_paused(
            snapshot.phase_duration_ms.min(planned_ms),
            snapshot.time_remaining_ms,
        );
        self.phase_started_at = Some(now);
        self.last_countdown_second = None;
        tracing::info!(
            phase = %self.phase,
            remaining_ms = snapshot.time_remaining_ms,
            "run restored from snapshot"
        );
        vec![Event::Restored {
            phase: self.phase,
            remaining_ms: self.timer.remaining_ms(now),
            captured_at: snapshot.captured_at,
            at: now,
        }]
    }

    /// Record a refused operation without changing state.
    pub(crate) fn reject(&mut self, error: EngineError) {
        tracing::warn!(error = %error, "operation rejected");
        self.last_rejection = Some(error);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish_phase(&mut self, skipped: bool, now: DateTime<Utc>) -> Vec<Event> {
        let finished = self.phase;
        let planned_ms = self.timer.duration_ms();
        let remaining_ms = self.timer.remaining_ms(now);
        self.timer.stop();
        self.timing.close_pause(now);
        tracing::debug!(phase = %finished, skipped, "phase finished");

        let mut events = vec![Event::PhaseCompleted {
            phase: finished,
            label: self.current_label(),
            planned_ms,
            elapsed_ms: planned_ms.saturating_sub(remaining_ms),
            skipped,
            started_at: self.phase_started_at.unwrap_or(now),
            at: now,
        }];
        events.extend(self.advance(now));
        events
    }

    /// Move past the current phase to whatever the sequence says comes next.
    fn advance(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        match self.phase {
            Phase::Preparing => self.enter(Phase::Working, now),
            Phase::Working => {
                self.cycle.complete_session();
                if !self.cycle.should_take_long_break() {
                    self.enter(Phase::Resting(RestKind::Short), now)
                } else if self.sequence.is_final_round(self.round) {
                    self.finish_run(now)
                } else {
                    self.enter(Phase::Resting(RestKind::Long), now)
                }
            }
            Phase::Resting(RestKind::Short) => {
                self.cycle.prepare_next_session();
                self.enter(Phase::Working, now)
            }
            Phase::Resting(RestKind::Long) => {
                self.cycle.start_new_cycle();
                let finished_round = self.round;
                self.round = self.round.saturating_add(1);
                let mut events = vec![Event::CycleCompleted {
                    round: finished_round,
                    at: now,
                }];
                events.extend(self.enter(Phase::Working, now));
                events
            }
            Phase::Idle | Phase::Completed => Vec::new(),
        }
    }

    fn enter(&mut self, phase: Phase, now: DateTime<Utc>) -> Vec<Event> {
        self.phase = phase;
        let session_number = self.cycle.current_session_number();
        let duration_ms = self.sequence.duration_ms(phase, session_number);
        if duration_ms == 0 && phase != Phase::Working {
            // Zero-length prep or rest: go straight to what follows it.
            return self.advance(now);
        }
        self.timer.start(duration_ms, now);
        self.phase_started_at = Some(now);
        self.last_countdown_second = None;
        self.feedback.emit(FeedbackCue::PhaseEntered(phase));
        tracing::debug!(%phase, duration_ms, session_number, round = self.round, "phase started");
        vec![Event::PhaseStarted {
            phase,
            label: self.sequence.label(phase, session_number),
            duration_ms,
            session_number,
            round: self.round,
            at: now,
        }]
    }

    fn finish_run(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        self.phase = Phase::Completed;
        self.timer.stop();
        self.timing.close_pause(now);
        self.timing.finished_at = Some(now);
        self.phase_started_at = None;
        self.feedback.emit(FeedbackCue::RunCompleted);
        tracing::info!(run_id = ?self.run_id, "run completed");
        let mut events = vec![Event::RunCompleted {
            run_id: self.run_id,
            sequence: self.sequence.name.clone(),
            started_at: self.timing.session_start,
            elapsed_active_ms: self.timing.elapsed_active_ms(now).unwrap_or(0),
            at: now,
        }];
        events.extend(self.apply_pending(now));
        events
    }

    fn clear_run(&mut self) {
        self.timer.stop();
        self.phase = Phase::Idle;
        self.cycle = CycleCounter::new(self.sequence.cycle_length());
        self.round = 1;
        self.timing = RunTiming::default();
        self.run_id = None;
        self.phase_started_at = None;
        self.last_countdown_second = None;
    }

    fn apply_pending(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let Some(sequence) = self.pending_sequence.take() else {
            return Vec::new();
        };
        tracing::info!(sequence = %sequence.name, "configuration applied");
        self.sequence = sequence;
        self.cycle.update_cycle_length(self.sequence.cycle_length());
        vec![Event::ConfigurationApplied {
            sequence: self.sequence.name.clone(),
            at: now,
        }]
    }

    fn countdown_cue(&mut self, remaining_ms: u64) {
        let window = self.feedback.countdown_secs();
        let seconds_left = remaining_ms.div_ceil(1000);
        if seconds_left == 0 || seconds_left > window {
            return;
        }
        if self.last_countdown_second != Some(seconds_left) {
            self.last_countdown_second = Some(seconds_left);
            self.feedback.emit(FeedbackCue::Countdown { seconds_left });
        }
    }
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self::new(PhaseSequence::default())
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("sequence", &self.sequence.name)
            .field("phase", &self.phase)
            .field("cycle", &self.cycle)
            .field("round", &self.round)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
