use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestKind {
    Short,
    Long,
}

/// The stage a run is in.
///
/// `Idle` and `Completed` carry no countdown; every other phase owns
/// exactly one deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rest", rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Preparing,
    Working,
    Resting(RestKind),
    Completed,
}

impl Phase {
    pub fn is_timed(self) -> bool {
        matches!(self, Phase::Preparing | Phase::Working | Phase::Resting(_))
    }

    /// `Idle` or `Completed`: a new run may start from here.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Idle | Phase::Completed)
    }

    pub fn is_rest(self) -> bool {
        matches!(self, Phase::Resting(_))
    }

    /// Short machine name, used for storage and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Working => "working",
            Phase::Resting(RestKind::Short) => "short_rest",
            Phase::Resting(RestKind::Long) => "long_rest",
            Phase::Completed => "completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Working => "working",
            Phase::Resting(RestKind::Short) => "short rest",
            Phase::Resting(RestKind::Long) => "long rest",
            Phase::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_and_terminal_are_disjoint() {
        let all = [
            Phase::Idle,
            Phase::Preparing,
            Phase::Working,
            Phase::Resting(RestKind::Short),
            Phase::Resting(RestKind::Long),
            Phase::Completed,
        ];
        for phase in all {
            assert_ne!(phase.is_timed(), phase.is_terminal(), "{phase}");
        }
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&Phase::Resting(RestKind::Long)).unwrap();
        assert_eq!(json, r#"{"kind":"resting","rest":"long"}"#);
        let back: Phase = serde_json::from_str(r#"{"kind":"working"}"#).unwrap();
        assert_eq!(back, Phase::Working);
    }
}
