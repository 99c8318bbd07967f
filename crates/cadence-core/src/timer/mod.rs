mod countdown;
mod cycle;
mod engine;
mod phase;
mod sequence;

pub use countdown::{PhaseTimer, TimerUpdate};
pub use cycle::CycleCounter;
pub use engine::{RunTiming, SessionEngine, TimerSignal};
pub use phase::{Phase, RestKind};
pub use sequence::{DurationSource, Exhaustion, PhaseSequence, WorkSegment};
