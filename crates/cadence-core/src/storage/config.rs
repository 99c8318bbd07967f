//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Focus session durations and cycle length
//! - The workout circuit (exercise list, rests, rounds)
//! - Feedback switches (sound, haptics, countdown length)
//! - Recovery staleness window and tick interval
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Bounds applied by [`SessionConfig::clamped`], in seconds.
pub const WORK_SECS_RANGE: (u64, u64) = (60, 7200);
pub const REST_SECS_RANGE: (u64, u64) = (0, 7200);
pub const PREP_SECS_RANGE: (u64, u64) = (0, 600);
pub const CYCLE_LENGTH_RANGE: (u32, u32) = (1, 20);

/// Bounds applied by [`CircuitConfig::clamped`].
pub const EXERCISE_SECS_RANGE: (u64, u64) = (5, 600);
pub const CIRCUIT_REST_SECS_RANGE: (u64, u64) = (0, 600);
pub const CIRCUIT_PREP_SECS_RANGE: (u64, u64) = (0, 60);
pub const ROUNDS_RANGE: (u32, u32) = (1, 10);

/// Bounds applied by [`FeedbackConfig::clamped`] and [`RecoveryConfig::clamped`].
pub const COUNTDOWN_SECS_RANGE: (u64, u64) = (0, 10);
pub const STALENESS_SECS_RANGE: (i64, i64) = (60, 7 * 24 * 60 * 60);

pub const MAX_TICK_MS: u64 = 1000;

/// Focus-timer durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_work_secs")]
    pub work_secs: u64,
    #[serde(default = "default_short_rest_secs")]
    pub short_rest_secs: u64,
    #[serde(default = "default_long_rest_secs")]
    pub long_rest_secs: u64,
    #[serde(default = "default_sessions_per_cycle")]
    pub sessions_per_cycle: u32,
    /// Zero skips the preparing phase.
    #[serde(default)]
    pub prep_secs: u64,
}

impl SessionConfig {
    /// Copy with every field pulled into its accepted range.
    pub fn clamped(&self) -> Self {
        Self {
            work_secs: clamp(self.work_secs, WORK_SECS_RANGE),
            short_rest_secs: clamp(self.short_rest_secs, REST_SECS_RANGE),
            long_rest_secs: clamp(self.long_rest_secs, REST_SECS_RANGE),
            sessions_per_cycle: clamp(self.sessions_per_cycle, CYCLE_LENGTH_RANGE),
            prep_secs: clamp(self.prep_secs, PREP_SECS_RANGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    /// Overrides the circuit's `work_secs` for this exercise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_secs: Option<u64>,
}

impl Exercise {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work_secs: None,
        }
    }
}

/// Interval-workout circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_exercise_secs")]
    pub work_secs: u64,
    /// Rest between exercises.
    #[serde(default = "default_circuit_rest_secs")]
    pub rest_secs: u64,
    /// Rest between rounds.
    #[serde(default = "default_round_rest_secs")]
    pub round_rest_secs: u64,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_circuit_prep_secs")]
    pub prep_secs: u64,
    #[serde(default = "default_exercises")]
    pub exercises: Vec<Exercise>,
}

impl CircuitConfig {
    pub fn clamped(&self) -> Self {
        let mut exercises: Vec<Exercise> = self
            .exercises
            .iter()
            .filter(|e| !e.name.trim().is_empty())
            .map(|e| Exercise {
                name: e.name.trim().to_string(),
                work_secs: e.work_secs.map(|s| clamp(s, EXERCISE_SECS_RANGE)),
            })
            .collect();
        if exercises.is_empty() {
            exercises = default_exercises();
        }
        Self {
            work_secs: clamp(self.work_secs, EXERCISE_SECS_RANGE),
            rest_secs: clamp(self.rest_secs, CIRCUIT_REST_SECS_RANGE),
            round_rest_secs: clamp(self.round_rest_secs, CIRCUIT_REST_SECS_RANGE),
            rounds: clamp(self.rounds, ROUNDS_RANGE),
            prep_secs: clamp(self.prep_secs, CIRCUIT_PREP_SECS_RANGE),
            exercises,
        }
    }
}

/// Feedback switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default = "default_true")]
    pub haptics: bool,
    /// Final seconds of a phase that get a countdown cue.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
}

impl FeedbackConfig {
    pub fn clamped(&self) -> Self {
        Self {
            countdown_secs: clamp(self.countdown_secs, COUNTDOWN_SECS_RANGE),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Snapshots older than this are discarded on restore.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: i64,
}

impl RecoveryConfig {
    pub fn clamped(&self) -> Self {
        Self {
            staleness_secs: clamp(self.staleness_secs, STALENESS_SECS_RANGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interval between timer ticks; capped at one second.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms.clamp(10, MAX_TICK_MS))
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
}

fn clamp<T: Ord>(value: T, (lo, hi): (T, T)) -> T {
    value.clamp(lo, hi)
}

// Default functions
fn default_work_secs() -> u64 {
    25 * 60
}
fn default_short_rest_secs() -> u64 {
    5 * 60
}
fn default_long_rest_secs() -> u64 {
    15 * 60
}
fn default_sessions_per_cycle() -> u32 {
    4
}
fn default_exercise_secs() -> u64 {
    30
}
fn default_circuit_rest_secs() -> u64 {
    10
}
fn default_round_rest_secs() -> u64 {
    60
}
fn default_rounds() -> u32 {
    1
}
fn default_circuit_prep_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_countdown_secs() -> u64 {
    3
}
fn default_staleness_secs() -> i64 {
    2 * 60 * 60
}
fn default_tick_ms() -> u64 {
    250
}

fn default_exercises() -> Vec<Exercise> {
    [
        "Jumping Jacks",
        "Wall Sit",
        "Push-ups",
        "Abdominal Crunches",
        "Step-ups",
        "Squats",
        "Triceps Dips",
        "Plank",
        "High Knees",
        "Lunges",
        "Push-up and Rotation",
        "Side Plank",
    ]
    .into_iter()
    .map(Exercise::new)
    .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_secs: default_work_secs(),
            short_rest_secs: default_short_rest_secs(),
            long_rest_secs: default_long_rest_secs(),
            sessions_per_cycle: default_sessions_per_cycle(),
            prep_secs: 0,
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            work_secs: default_exercise_secs(),
            rest_secs: default_circuit_rest_secs(),
            round_rest_secs: default_round_rest_secs(),
            rounds: default_rounds(),
            prep_secs: default_circuit_prep_secs(),
            exercises: default_exercises(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            sound: true,
            haptics: true,
            countdown_secs: default_countdown_secs(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first use.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse
    /// as the type already stored under it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let parsed: Config = toml::from_str("[session]\nwork_secs = 3000\n").unwrap();
        assert_eq!(parsed.session.work_secs, 3000);
        assert_eq!(parsed.session.sessions_per_cycle, 4);
        assert_eq!(parsed.recovery.staleness_secs, 7200);
        assert_eq!(parsed.circuit.exercises.len(), 12);
    }

    #[test]
    fn session_config_clamps_out_of_range_values() {
        let cfg = SessionConfig {
            work_secs: 5,
            short_rest_secs: 99_999,
            long_rest_secs: 900,
            sessions_per_cycle: 0,
            prep_secs: 10_000,
        }
        .clamped();
        assert_eq!(cfg.work_secs, 60);
        assert_eq!(cfg.short_rest_secs, 7200);
        assert_eq!(cfg.long_rest_secs, 900);
        assert_eq!(cfg.sessions_per_cycle, 1);
        assert_eq!(cfg.prep_secs, 600);

        let cfg = SessionConfig {
            sessions_per_cycle: 50,
            ..SessionConfig::default()
        }
        .clamped();
        assert_eq!(cfg.sessions_per_cycle, 20);
    }

    #[test]
    fn circuit_clamp_drops_blank_exercises_and_restores_defaults_when_empty() {
        let cfg = CircuitConfig {
            exercises: vec![Exercise::new("  "), Exercise::new("Burpees")],
            ..CircuitConfig::default()
        }
        .clamped();
        assert_eq!(cfg.exercises, vec![Exercise::new("Burpees")]);

        let cfg = CircuitConfig {
            exercises: vec![],
            rounds: 0,
            ..CircuitConfig::default()
        }
        .clamped();
        assert_eq!(cfg.exercises.len(), 12);
        assert_eq!(cfg.rounds, 1);
    }

    #[test]
    fn feedback_and_recovery_clamp_extremes() {
        let feedback = FeedbackConfig {
            countdown_secs: u64::MAX,
            ..FeedbackConfig::default()
        }
        .clamped();
        assert_eq!(feedback.countdown_secs, 10);
        assert!(feedback.sound);

        let recovery = RecoveryConfig { staleness_secs: i64::MAX }.clamped();
        assert_eq!(recovery.staleness_secs, 7 * 24 * 60 * 60);
        let recovery = RecoveryConfig { staleness_secs: -5 }.clamped();
        assert_eq!(recovery.staleness_secs, 60);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("session.work_secs").as_deref(), Some("1500"));
        assert_eq!(cfg.get("feedback.sound").as_deref(), Some("true"));
        assert!(cfg.get("session.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("feedback.haptics", "false").unwrap();
        cfg.set("session.sessions_per_cycle", "6").unwrap();
        cfg.set("circuit.exercises", r#"[{"name":"Burpees","work_secs":45}]"#)
            .unwrap();
        assert!(!cfg.feedback.haptics);
        assert_eq!(cfg.session.sessions_per_cycle, 6);
        assert_eq!(cfg.circuit.exercises[0].work_secs, Some(45));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("session.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("feedback.sound", "loud"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.session.prep_secs = 15;
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().session.prep_secs, 15);
    }

    #[test]
    fn tick_interval_is_capped_at_one_second() {
        let rt = RuntimeConfig { tick_ms: 5_000 };
        assert_eq!(rt.tick_interval(), std::time::Duration::from_secs(1));
    }
}
