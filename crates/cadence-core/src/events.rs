use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::Phase;

/// Every state change of the engine produces an Event.
/// The UI renders from them; history storage records from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        sequence: String,
        at: DateTime<Utc>,
    },
    PhaseStarted {
        phase: Phase,
        label: String,
        duration_ms: u64,
        session_number: u32,
        round: u32,
        at: DateTime<Utc>,
    },
    Tick {
        phase: Phase,
        remaining_ms: u64,
        progress: f64,
        at: DateTime<Utc>,
    },
    PhaseCompleted {
        phase: Phase,
        label: String,
        planned_ms: u64,
        /// Active time spent in the phase, pauses excluded.
        elapsed_ms: u64,
        skipped: bool,
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A long rest finished and the cycle counters were reset.
    CycleCompleted {
        round: u32,
        at: DateTime<Utc>,
    },
    Paused {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    RunStopped {
        run_id: Option<Uuid>,
        sequence: String,
        started_at: Option<DateTime<Utc>>,
        elapsed_active_ms: u64,
        at: DateTime<Utc>,
    },
    RunCompleted {
        run_id: Option<Uuid>,
        sequence: String,
        started_at: Option<DateTime<Utc>>,
        elapsed_active_ms: u64,
        at: DateTime<Utc>,
    },
    EngineReset {
        at: DateTime<Utc>,
    },
    /// A new sequence was accepted but waits for the run to end.
    ConfigurationDeferred {
        sequence: String,
        at: DateTime<Utc>,
    },
    ConfigurationApplied {
        sequence: String,
        at: DateTime<Utc>,
    },
    /// A recovery snapshot was loaded; the engine waits for `resume()`.
    Restored {
        phase: Phase,
        remaining_ms: u64,
        captured_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    StateSnapshot(EngineStatus),
}

/// Everything the UI observes about an engine at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub phase: Phase,
    pub label: String,
    pub is_paused: bool,
    pub time_remaining_ms: u64,
    pub phase_duration_ms: u64,
    pub progress: f64,
    pub current_session_number: u32,
    pub sessions_completed_in_cycle: u32,
    pub cycle_length: u32,
    pub round: u32,
    pub current_session_duration_ms: Option<u64>,
    pub sequence: String,
    pub at: DateTime<Utc>,
}

impl Event {
    /// Name of the variant, as written in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "RunStarted",
            Event::PhaseStarted { .. } => "PhaseStarted",
            Event::Tick { .. } => "Tick",
            Event::PhaseCompleted { .. } => "PhaseCompleted",
            Event::CycleCompleted { .. } => "CycleCompleted",
            Event::Paused { .. } => "Paused",
            Event::Resumed { .. } => "Resumed",
            Event::RunStopped { .. } => "RunStopped",
            Event::RunCompleted { .. } => "RunCompleted",
            Event::EngineReset { .. } => "EngineReset",
            Event::ConfigurationDeferred { .. } => "ConfigurationDeferred",
            Event::ConfigurationApplied { .. } => "ConfigurationApplied",
            Event::Restored { .. } => "Restored",
            Event::StateSnapshot(_) => "StateSnapshot",
        }
    }
}
