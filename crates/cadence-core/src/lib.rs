//! # Cadence Core Library
//!
//! Phase sequencing for interval timers: the focus timer (work, short
//! rest, long rest after every N sessions) and the circuit workout
//! (preparation, exercises, rests, finite rounds) run on one engine.
//! The `cadence` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine over a
//!   [`PhaseSequence`]. The owner calls `tick()`, or lets the async
//!   [`runtime`] drive it.
//! - **Feedback**: Haptic and sound ports the engine fires cues into,
//!   best effort.
//! - **Recovery**: Snapshots of an in-flight run, restored after the host
//!   was backgrounded or relaunched.
//! - **Storage**: SQLite phase history and key-value store, TOML
//!   configuration.
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: Core phase state machine
//! - [`Session`]: Engine plus recovery slot and lifecycle hooks
//! - [`SessionRunner`]: Tokio task driving a session
//! - [`Database`]: History, statistics and snapshot persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod feedback;
pub mod recovery;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, EngineError, RecoveryError, ValidationError};
pub use events::{EngineStatus, Event};
pub use feedback::{FeedbackHub, HapticFeedback, HapticPattern, SoundCue, SoundFeedback};
pub use recovery::{RecoveryManager, RecoverySnapshot, RestoreOutcome, SnapshotStore};
pub use runtime::{Command, SessionHandle, SessionRunner};
pub use session::Session;
pub use storage::{Config, Database, Stats};
pub use timer::{CycleCounter, Phase, PhaseSequence, PhaseTimer, RestKind, SessionEngine};
