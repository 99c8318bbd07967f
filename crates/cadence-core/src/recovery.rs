//! Snapshot/restore of an in-flight run across backgrounding and relaunch.
//!
//! A snapshot is written when the host goes to the background and read back
//! when it returns. Snapshots older than the staleness window, or captured
//! in a non-timed phase, are thrown away instead of restored.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, RecoveryError, Result};
use crate::events::Event;
use crate::storage::config::RecoveryConfig;
use crate::timer::{Phase, PhaseSequence, SessionEngine};

pub const SNAPSHOT_KEY: &str = "recovery.snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub version: u32,
    pub run_id: Option<Uuid>,
    pub sequence: PhaseSequence,
    pub phase: Phase,
    /// Whether the user had paused before the capture.
    pub paused: bool,
    pub time_remaining_ms: u64,
    pub phase_duration_ms: u64,
    pub session_start_time: DateTime<Utc>,
    pub total_paused_ms: u64,
    #[serde(default)]
    pub pause_started_at: Option<DateTime<Utc>>,
    pub current_session_number: u32,
    pub sessions_completed_in_cycle: u32,
    /// Long-rest threshold at capture; absent in older snapshots.
    #[serde(default)]
    pub cycle_length: Option<u32>,
    pub round: u32,
    pub captured_at: DateTime<Utc>,
}

impl RecoverySnapshot {
    pub const VERSION: u32 = 1;

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.captured_at
    }
}

/// String-keyed blob storage for snapshots.
pub trait SnapshotStore {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, blob: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-process store, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for &S {
    fn load(&self, key: &str) -> Result<Option<String>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        (**self).save(key, blob)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// The engine now holds the saved run, paused.
    Restored(Vec<Event>),
    NothingSaved,
    /// Discarded: captured longer ago than the staleness window.
    Stale { age_secs: i64 },
    /// Discarded: captured outside a timed phase.
    Terminal,
    /// Discarded: the blob did not decode.
    Corrupt,
    /// Kept: the engine already has a run of its own.
    EngineBusy,
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored(_))
    }
}

pub struct RecoveryManager<S> {
    store: S,
    staleness: Duration,
    key: String,
}

impl<S: SnapshotStore> RecoveryManager<S> {
    pub fn new(store: S, config: &RecoveryConfig) -> Self {
        Self {
            store,
            staleness: Duration::seconds(config.clamped().staleness_secs),
            key: SNAPSHOT_KEY.to_string(),
        }
    }

    /// Store snapshots under a different key (one per engine).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness
    }

    /// Write the engine's run, or clear the slot when there is none.
    /// Returns whether a snapshot was written.
    pub fn save_state(&self, engine: &SessionEngine) -> Result<bool> {
        match engine.capture_snapshot() {
            Some(snapshot) => {
                let blob = serde_json::to_string(&snapshot)?;
                self.store.save(&self.key, &blob)?;
                tracing::debug!(phase = %snapshot.phase, remaining_ms = snapshot.time_remaining_ms, "recovery snapshot saved");
                Ok(true)
            }
            None => {
                self.store.clear(&self.key)?;
                Ok(false)
            }
        }
    }

    /// Read the saved snapshot without touching it.
    pub fn peek(&self) -> Result<Option<RecoverySnapshot>> {
        match self.store.load(&self.key)? {
            None => Ok(None),
            Some(blob) => serde_json::from_str(&blob).map(Some).map_err(|e| {
                RecoveryError::Corrupt {
                    key: self.key.clone(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn discard(&self) -> Result<()> {
        self.store.clear(&self.key)
    }

    /// Rehydrate `engine` from the saved snapshot if it is still fresh.
    ///
    /// The engine is left paused on success; nothing resumes by itself.
    pub fn restore_state(&self, engine: &mut SessionEngine) -> Result<RestoreOutcome> {
        let Some(blob) = self.store.load(&self.key)? else {
            return Ok(RestoreOutcome::NothingSaved);
        };
        let snapshot: RecoverySnapshot = match serde_json::from_str(&blob) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding unreadable recovery snapshot");
                self.store.clear(&self.key)?;
                return Ok(RestoreOutcome::Corrupt);
            }
        };

        if !engine.phase().is_terminal() {
            engine.reject(EngineError::AlreadyInProgress {
                phase: engine.phase(),
            });
            return Ok(RestoreOutcome::EngineBusy);
        }

        let age = snapshot.age(engine.now());
        if age > self.staleness {
            engine.reject(EngineError::StaleRecoverySnapshot {
                age_secs: age.num_seconds(),
                window_secs: self.staleness.num_seconds(),
            });
            self.store.clear(&self.key)?;
            return Ok(RestoreOutcome::Stale {
                age_secs: age.num_seconds(),
            });
        }

        if !snapshot.phase.is_timed() {
            tracing::debug!(phase = %snapshot.phase, "discarding snapshot of a finished run");
            self.store.clear(&self.key)?;
            return Ok(RestoreOutcome::Terminal);
        }

        if let Err(e) = snapshot.sequence.validate() {
            tracing::warn!(key = %self.key, error = %e, "discarding snapshot with an out-of-range sequence");
            self.store.clear(&self.key)?;
            return Ok(RestoreOutcome::Corrupt);
        }

        let events = engine.rehydrate(snapshot);
        self.store.clear(&self.key)?;
        Ok(RestoreOutcome::Restored(events))
    }
}
