//! Declarative description of a run.
//!
//! A [`PhaseSequence`] tells the engine how long each phase lasts and what
//! happens once the segment list is exhausted. The focus timer and the
//! interval workout are both just sequences:
//!
//! ```text
//! focus:    [prep] -> work -> short -> work -> ... -> work -> long -> work ...  (forever)
//! workout:  prep -> ex1 -> rest -> ex2 -> ... -> exN -> round rest -> ex1 ... -> completed
//! ```

use serde::{Deserialize, Serialize};

use super::phase::{Phase, RestKind};
use crate::error::ValidationError;
use crate::storage::config::{
    CircuitConfig, SessionConfig, CIRCUIT_PREP_SECS_RANGE, CIRCUIT_REST_SECS_RANGE,
    CYCLE_LENGTH_RANGE, EXERCISE_SECS_RANGE, PREP_SECS_RANGE, REST_SECS_RANGE, ROUNDS_RANGE,
    WORK_SECS_RANGE,
};

/// Where a work segment takes its length from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DurationSource {
    /// The sequence-wide `work_secs`.
    Configured,
    Fixed { secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSegment {
    pub label: String,
    pub duration: DurationSource,
}

/// What to do after the last segment of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Exhaustion {
    /// Take the long rest and start over, until stopped.
    Repeat,
    /// Run `rounds` cycles, with long rests in between, then complete.
    Complete { rounds: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSequence {
    pub name: String,
    pub prep_secs: u64,
    pub work_secs: u64,
    pub short_rest_secs: u64,
    pub long_rest_secs: u64,
    pub segments: Vec<WorkSegment>,
    pub exhaustion: Exhaustion,
}

impl PhaseSequence {
    /// Build and validate a custom sequence.
    ///
    /// Repeating sequences are held to the `[session]` bounds and finite
    /// ones to the `[circuit]` bounds, see [`validate`](Self::validate).
    pub fn custom(
        name: impl Into<String>,
        prep_secs: u64,
        work_secs: u64,
        short_rest_secs: u64,
        long_rest_secs: u64,
        segments: Vec<WorkSegment>,
        exhaustion: Exhaustion,
    ) -> Result<Self, ValidationError> {
        let sequence = Self {
            name: name.into(),
            prep_secs,
            work_secs,
            short_rest_secs,
            long_rest_secs,
            segments,
            exhaustion,
        };
        sequence.validate()?;
        Ok(sequence)
    }

    /// The focus timer: `sessions_per_cycle` work phases per cycle, repeating.
    pub fn focus(config: &SessionConfig) -> Self {
        let config = config.clamped();
        let segments = (1..=config.sessions_per_cycle)
            .map(|i| WorkSegment {
                label: format!("Focus {i}"),
                duration: DurationSource::Configured,
            })
            .collect();
        Self {
            name: "focus".into(),
            prep_secs: config.prep_secs,
            work_secs: config.work_secs,
            short_rest_secs: config.short_rest_secs,
            long_rest_secs: config.long_rest_secs,
            segments,
            exhaustion: Exhaustion::Repeat,
        }
    }

    /// The interval workout: one segment per exercise, a fixed number of rounds.
    pub fn circuit(config: &CircuitConfig) -> Self {
        let config = config.clamped();
        let segments = config
            .exercises
            .iter()
            .map(|e| WorkSegment {
                label: e.name.clone(),
                duration: match e.work_secs {
                    Some(secs) => DurationSource::Fixed { secs },
                    None => DurationSource::Configured,
                },
            })
            .collect();
        Self {
            name: "workout".into(),
            prep_secs: config.prep_secs,
            work_secs: config.work_secs,
            short_rest_secs: config.rest_secs,
            long_rest_secs: config.round_rest_secs,
            segments,
            exhaustion: Exhaustion::Complete {
                rounds: config.rounds,
            },
        }
    }

    /// Check every duration against the bounds of the matching preset.
    ///
    /// `Repeat` sequences use the focus ranges, `Complete` sequences the
    /// circuit ranges. [`focus`](Self::focus) and [`circuit`](Self::circuit)
    /// always pass.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.segments.is_empty() {
            return Err(ValidationError::EmptyCollection("segments".into()));
        }
        let bounds = Bounds::for_exhaustion(self.exhaustion);
        if let Exhaustion::Complete { rounds } = self.exhaustion {
            check_range("rounds", rounds, ROUNDS_RANGE, "")?;
        }
        if let Some(range) = bounds.segments {
            check_range("segments", self.cycle_length(), range, " segments")?;
        }
        check_range("prep_secs", self.prep_secs, bounds.prep, "s")?;
        check_range("short_rest_secs", self.short_rest_secs, bounds.rest, "s")?;
        check_range("long_rest_secs", self.long_rest_secs, bounds.rest, "s")?;
        for (i, segment) in self.segments.iter().enumerate() {
            check_range(&format!("segments[{i}]"), self.segment_secs(segment), bounds.work, "s")?;
        }
        Ok(())
    }

    /// Work phases per cycle.
    pub fn cycle_length(&self) -> u32 {
        self.segments.len().max(1) as u32
    }

    /// Whether `round` is the last one the sequence allows.
    pub fn is_final_round(&self, round: u32) -> bool {
        match self.exhaustion {
            Exhaustion::Repeat => false,
            Exhaustion::Complete { rounds } => round >= rounds,
        }
    }

    /// The work segment for a 1-based session number.
    pub fn segment(&self, session_number: u32) -> Option<&WorkSegment> {
        let len = self.segments.len();
        if len == 0 {
            return None;
        }
        let index = (session_number.max(1) as usize - 1) % len;
        self.segments.get(index)
    }

    /// Planned length of `phase` when it is entered at `session_number`.
    pub fn duration_ms(&self, phase: Phase, session_number: u32) -> u64 {
        let secs = match phase {
            Phase::Idle | Phase::Completed => 0,
            Phase::Preparing => self.prep_secs,
            Phase::Working => self
                .segment(session_number)
                .map(|s| self.segment_secs(s))
                .unwrap_or(self.work_secs),
            Phase::Resting(RestKind::Short) => self.short_rest_secs,
            Phase::Resting(RestKind::Long) => self.long_rest_secs,
        };
        secs.saturating_mul(1000)
    }

    /// Display label for `phase` at `session_number`.
    pub fn label(&self, phase: Phase, session_number: u32) -> String {
        match phase {
            Phase::Working => self
                .segment(session_number)
                .map(|s| s.label.clone())
                .unwrap_or_else(|| "Work".into()),
            Phase::Preparing => "Get Ready".into(),
            Phase::Resting(RestKind::Short) => "Short Rest".into(),
            Phase::Resting(RestKind::Long) => "Long Rest".into(),
            Phase::Idle => String::new(),
            Phase::Completed => "Done".into(),
        }
    }

    fn segment_secs(&self, segment: &WorkSegment) -> u64 {
        match segment.duration {
            DurationSource::Configured => self.work_secs,
            DurationSource::Fixed { secs } => secs,
        }
    }
}

struct Bounds {
    work: (u64, u64),
    prep: (u64, u64),
    rest: (u64, u64),
    segments: Option<(u32, u32)>,
}

impl Bounds {
    fn for_exhaustion(exhaustion: Exhaustion) -> Self {
        match exhaustion {
            Exhaustion::Repeat => Self {
                work: WORK_SECS_RANGE,
                prep: PREP_SECS_RANGE,
                rest: REST_SECS_RANGE,
                segments: Some(CYCLE_LENGTH_RANGE),
            },
            Exhaustion::Complete { .. } => Self {
                work: EXERCISE_SECS_RANGE,
                prep: CIRCUIT_PREP_SECS_RANGE,
                rest: CIRCUIT_REST_SECS_RANGE,
                segments: None,
            },
        }
    }
}

fn check_range<T>(field: &str, value: T, (lo, hi): (T, T), unit: &str) -> Result<(), ValidationError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < lo || value > hi {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("{value}{unit} is outside {lo}{unit}..={hi}{unit}"),
        });
    }
    Ok(())
}

impl Default for PhaseSequence {
    fn default() -> Self {
        Self::focus(&SessionConfig::default())
    }
}
