//! SQLite-based history storage and statistics.
//!
//! Provides persistent storage for:
//! - Finished timed phases (work, rests, prep)
//! - Finished runs, completed or stopped
//! - Key-value store for application state (recovery snapshots)

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::events::Event;
use crate::recovery::SnapshotStore;
use crate::timer::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: i64,
    pub phase: String,
    pub label: String,
    pub planned_ms: u64,
    pub elapsed_ms: u64,
    pub skipped: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Stopped,
}

impl RunOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub work_phases: u64,
    pub focus_min: u64,
    pub rest_min: u64,
    pub skipped_phases: u64,
    pub completed_runs: u64,
    pub stopped_runs: u64,
}

/// SQLite database for phase history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/cadence.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let dir = data_dir()?;
        Self::open_at(&dir.join("cadence.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Persist the parts of `event` that belong in history. Other events
    /// are ignored.
    pub fn record_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::PhaseCompleted {
                phase,
                label,
                planned_ms,
                elapsed_ms,
                skipped,
                started_at,
                at,
            } => {
                self.record_phase(*phase, label, *planned_ms, *elapsed_ms, *skipped, *started_at, *at)?;
            }
            Event::RunCompleted {
                run_id,
                sequence,
                started_at,
                elapsed_active_ms,
                at,
            } => {
                self.record_run(run_id.map(|id| id.to_string()), sequence, RunOutcome::Completed, *started_at, *at, *elapsed_active_ms)?;
            }
            Event::RunStopped {
                run_id,
                sequence,
                started_at,
                elapsed_active_ms,
                at,
            } => {
                self.record_run(run_id.map(|id| id.to_string()), sequence, RunOutcome::Stopped, *started_at, *at, *elapsed_active_ms)?;
            }
            _ => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_phase(
        &self,
        phase: Phase,
        label: &str,
        planned_ms: u64,
        elapsed_ms: u64,
        skipped: bool,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO phases (phase, label, planned_ms, elapsed_ms, skipped, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                phase.as_str(),
                label,
                planned_ms,
                elapsed_ms,
                skipped,
                started_at.to_rfc3339(),
                completed_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn record_run(
        &self,
        run_id: Option<String>,
        sequence: &str,
        outcome: RunOutcome,
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        elapsed_active_ms: u64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (run_id, sequence, outcome, started_at, ended_at, elapsed_active_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                sequence,
                outcome.as_str(),
                started_at.map(|t| t.to_rfc3339()),
                ended_at.to_rfc3339(),
                elapsed_active_ms,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent phases first.
    pub fn recent_phases(&self, limit: usize) -> Result<Vec<PhaseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phase, label, planned_ms, elapsed_ms, skipped, started_at, completed_at
             FROM phases ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, phase, label, planned_ms, elapsed_ms, skipped, started, completed) = row?;
            records.push(PhaseRecord {
                id,
                phase,
                label,
                planned_ms,
                elapsed_ms,
                skipped,
                started_at: parse_ts(&started)?,
                completed_at: parse_ts(&completed)?,
            });
        }
        Ok(records)
    }

    pub fn stats_today(&self) -> Result<Stats> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.stats_since(Some(format!("{today}T00:00:00+00:00")))
    }

    pub fn stats_all(&self) -> Result<Stats> {
        self.stats_since(None)
    }

    fn stats_since(&self, since: Option<String>) -> Result<Stats> {
        let since = since.unwrap_or_default();
        let mut stats = Stats::default();

        let mut stmt = self.conn.prepare(
            "SELECT phase, COUNT(*), COALESCE(SUM(elapsed_ms), 0), COALESCE(SUM(skipped), 0)
             FROM phases
             WHERE completed_at >= ?1
             GROUP BY phase",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;
        for row in rows {
            let (phase, count, elapsed_ms, skipped) = row?;
            stats.skipped_phases += skipped;
            match phase.as_str() {
                "working" => {
                    stats.work_phases += count;
                    stats.focus_min += elapsed_ms / 60_000;
                }
                "short_rest" | "long_rest" => {
                    stats.rest_min += elapsed_ms / 60_000;
                }
                _ => {}
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT outcome, COUNT(*) FROM runs WHERE ended_at >= ?1 GROUP BY outcome",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (outcome, count) = row?;
            match outcome.as_str() {
                "completed" => stats.completed_runs += count,
                "stopped" => stats.stopped_runs += count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SnapshotStore for Database {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.kv_get(key)
    }

    fn save(&self, key: &str, blob: &str) -> Result<()> {
        self.kv_set(key, blob)
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.kv_delete(key)
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{value}': {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::RestKind;

    #[test]
    fn record_and_query() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.record_phase(Phase::Working, "Focus 1", 1_500_000, 1_500_000, false, now, now)
            .unwrap();
        db.record_phase(Phase::Resting(RestKind::Short), "Short Rest", 300_000, 120_000, true, now, now)
            .unwrap();
        let stats = db.stats_all().unwrap();
        assert_eq!(stats.work_phases, 1);
        assert_eq!(stats.focus_min, 25);
        assert_eq!(stats.rest_min, 2);
        assert_eq!(stats.skipped_phases, 1);

        let recent = db.recent_phases(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].phase, "short_rest");
        assert!(recent[0].skipped);
    }

    #[test]
    fn record_event_routes_history_events() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.record_event(&Event::RunStopped {
            run_id: None,
            sequence: "focus".into(),
            started_at: Some(now),
            elapsed_active_ms: 10_000,
            at: now,
        })
        .unwrap();
        db.record_event(&Event::EngineReset { at: now }).unwrap();
        let stats = db.stats_today().unwrap();
        assert_eq!(stats.stopped_runs, 1);
        assert_eq!(stats.completed_runs, 0);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
    }

    #[test]
    fn open_at_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.db");
        Database::open_at(&path).unwrap().kv_set("k", "v").unwrap();
        let reopened = Database::open_at(&path).unwrap();
        assert_eq!(reopened.kv_get("k").unwrap().as_deref(), Some("v"));
    }
}
