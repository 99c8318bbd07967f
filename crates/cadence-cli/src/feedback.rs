use std::io::Write;

use cadence_core::feedback::{FeedbackError, SoundCue, SoundFeedback};

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl SoundFeedback for TerminalBell {
    fn play(&self, cue: SoundCue) -> Result<(), FeedbackError> {
        let rings = match cue {
            SoundCue::CountdownTick => return Ok(()),
            SoundCue::Completion => 2,
            _ => 1,
        };
        let mut stderr = std::io::stderr().lock();
        for _ in 0..rings {
            stderr
                .write_all(b"\x07")
                .map_err(|e| FeedbackError::Playback(e.to_string()))?;
        }
        stderr
            .flush()
            .map_err(|e| FeedbackError::Playback(e.to_string()))
    }
}
