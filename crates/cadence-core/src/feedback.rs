//! Haptic and sound feedback ports.
//!
//! The engine never talks to a device. It hands a [`FeedbackCue`] to the
//! [`FeedbackHub`], which maps it to port calls and fires them without
//! waiting. A failing port is logged and otherwise ignored; phase
//! sequencing never depends on feedback succeeding.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::config::FeedbackConfig;
use crate::timer::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticPattern {
    Tap,
    Gentle,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Prepare,
    WorkStart,
    RestStart,
    CountdownTick,
    Completion,
}

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("feedback device unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

pub trait HapticFeedback: Send + Sync {
    fn play(&self, pattern: HapticPattern) -> Result<(), FeedbackError>;
}

pub trait SoundFeedback: Send + Sync {
    fn play(&self, cue: SoundCue) -> Result<(), FeedbackError>;
}

/// Moments the engine wants the user to notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCue {
    PhaseEntered(Phase),
    /// One of the final seconds of a timed phase.
    Countdown { seconds_left: u64 },
    RunCompleted,
}

impl FeedbackCue {
    fn signals(self) -> (Option<HapticPattern>, Option<SoundCue>) {
        match self {
            FeedbackCue::PhaseEntered(Phase::Preparing) => {
                (Some(HapticPattern::Gentle), Some(SoundCue::Prepare))
            }
            FeedbackCue::PhaseEntered(Phase::Working) => {
                (Some(HapticPattern::Tap), Some(SoundCue::WorkStart))
            }
            FeedbackCue::PhaseEntered(Phase::Resting(_)) => {
                (Some(HapticPattern::Gentle), Some(SoundCue::RestStart))
            }
            FeedbackCue::PhaseEntered(Phase::Completed) | FeedbackCue::RunCompleted => {
                (Some(HapticPattern::Success), Some(SoundCue::Completion))
            }
            FeedbackCue::PhaseEntered(Phase::Idle) => (None, None),
            FeedbackCue::Countdown { .. } => (Some(HapticPattern::Tap), Some(SoundCue::CountdownTick)),
        }
    }
}

/// Does nothing. The default for both ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedback;

impl HapticFeedback for NoopFeedback {
    fn play(&self, _pattern: HapticPattern) -> Result<(), FeedbackError> {
        Ok(())
    }
}

impl SoundFeedback for NoopFeedback {
    fn play(&self, _cue: SoundCue) -> Result<(), FeedbackError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSignal {
    Haptic(HapticPattern),
    Sound(SoundCue),
}

/// Test double that remembers every signal it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeedback {
    signals: Arc<Mutex<Vec<FeedbackSignal>>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<FeedbackSignal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sounds(&self) -> Vec<SoundCue> {
        self.signals()
            .into_iter()
            .filter_map(|s| match s {
                FeedbackSignal::Sound(cue) => Some(cue),
                FeedbackSignal::Haptic(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, signal: FeedbackSignal) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }
}

impl HapticFeedback for RecordingFeedback {
    fn play(&self, pattern: HapticPattern) -> Result<(), FeedbackError> {
        self.push(FeedbackSignal::Haptic(pattern));
        Ok(())
    }
}

impl SoundFeedback for RecordingFeedback {
    fn play(&self, cue: SoundCue) -> Result<(), FeedbackError> {
        self.push(FeedbackSignal::Sound(cue));
        Ok(())
    }
}

/// Routes engine cues to the injected ports.
#[derive(Clone)]
pub struct FeedbackHub {
    haptics: Arc<dyn HapticFeedback>,
    sound: Arc<dyn SoundFeedback>,
    haptics_enabled: bool,
    sound_enabled: bool,
    countdown_secs: u64,
}

impl FeedbackHub {
    pub fn new(haptics: Arc<dyn HapticFeedback>, sound: Arc<dyn SoundFeedback>) -> Self {
        Self {
            haptics,
            sound,
            haptics_enabled: true,
            sound_enabled: true,
            countdown_secs: 3,
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NoopFeedback), Arc::new(NoopFeedback))
    }

    /// Apply the `[feedback]` switches.
    pub fn configured(mut self, config: &FeedbackConfig) -> Self {
        let config = config.clamped();
        self.haptics_enabled = config.haptics;
        self.sound_enabled = config.sound;
        self.countdown_secs = config.countdown_secs;
        self
    }

    pub fn countdown_secs(&self) -> u64 {
        self.countdown_secs
    }

    pub fn emit(&self, cue: FeedbackCue) {
        let (haptic, sound) = cue.signals();
        if let (true, Some(pattern)) = (self.haptics_enabled, haptic) {
            let port = Arc::clone(&self.haptics);
            dispatch("haptic", move || port.play(pattern));
        }
        if let (true, Some(cue)) = (self.sound_enabled, sound) {
            let port = Arc::clone(&self.sound);
            dispatch("sound", move || port.play(cue));
        }
    }
}

impl Default for FeedbackHub {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for FeedbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackHub")
            .field("haptics_enabled", &self.haptics_enabled)
            .field("sound_enabled", &self.sound_enabled)
            .field("countdown_secs", &self.countdown_secs)
            .finish()
    }
}

/// Fire-and-forget on the current runtime's blocking pool, inline without one.
fn dispatch<F>(port: &'static str, play: F)
where
    F: FnOnce() -> Result<(), FeedbackError> + Send + 'static,
{
    let report = move |result: Result<(), FeedbackError>| {
        if let Err(e) = result {
            tracing::warn!(port, error = %e, "feedback port failed");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || report(play()));
        }
        Err(_) => report(play()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::RestKind;

    struct Broken;

    impl SoundFeedback for Broken {
        fn play(&self, _cue: SoundCue) -> Result<(), FeedbackError> {
            Err(FeedbackError::Unavailable("no speaker".into()))
        }
    }

    #[test]
    fn phase_cues_map_to_distinct_sounds() {
        let rec = RecordingFeedback::new();
        let hub = FeedbackHub::new(Arc::new(rec.clone()), Arc::new(rec.clone()));
        hub.emit(FeedbackCue::PhaseEntered(Phase::Working));
        hub.emit(FeedbackCue::PhaseEntered(Phase::Resting(RestKind::Short)));
        hub.emit(FeedbackCue::Countdown { seconds_left: 2 });
        hub.emit(FeedbackCue::RunCompleted);
        assert_eq!(
            rec.sounds(),
            vec![
                SoundCue::WorkStart,
                SoundCue::RestStart,
                SoundCue::CountdownTick,
                SoundCue::Completion
            ]
        );
        assert_eq!(rec.signals()[0], FeedbackSignal::Haptic(HapticPattern::Tap));
    }

    #[test]
    fn muted_ports_are_skipped() {
        let rec = RecordingFeedback::new();
        let hub = FeedbackHub::new(Arc::new(rec.clone()), Arc::new(rec.clone())).configured(
            &FeedbackConfig {
                sound: false,
                haptics: true,
                countdown_secs: 5,
            },
        );
        hub.emit(FeedbackCue::PhaseEntered(Phase::Working));
        assert_eq!(rec.signals(), vec![FeedbackSignal::Haptic(HapticPattern::Tap)]);
        assert_eq!(hub.countdown_secs(), 5);
    }

    #[test]
    fn failing_port_does_not_panic() {
        let rec = RecordingFeedback::new();
        let hub = FeedbackHub::new(Arc::new(rec.clone()), Arc::new(Broken));
        hub.emit(FeedbackCue::PhaseEntered(Phase::Working));
        assert_eq!(rec.signals().len(), 1);
    }
}
