//! An engine plus its recovery slot, and the host lifecycle hooks.

use crate::error::Result;
use crate::events::Event;
use crate::recovery::{RecoveryManager, RestoreOutcome, SnapshotStore};
use crate::timer::SessionEngine;

pub struct Session<S> {
    engine: SessionEngine,
    recovery: RecoveryManager<S>,
}

impl<S: SnapshotStore> Session<S> {
    pub fn new(engine: SessionEngine, recovery: RecoveryManager<S>) -> Self {
        Self { engine, recovery }
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SessionEngine {
        &mut self.engine
    }

    pub fn recovery(&self) -> &RecoveryManager<S> {
        &self.recovery
    }

    pub fn into_parts(self) -> (SessionEngine, RecoveryManager<S>) {
        (self.engine, self.recovery)
    }

    pub fn save_state(&self) -> Result<bool> {
        self.recovery.save_state(&self.engine)
    }

    pub fn restore_state(&mut self) -> Result<RestoreOutcome> {
        self.recovery.restore_state(&mut self.engine)
    }

    /// The app is going to the background.
    pub fn handle_background_transition(&mut self) -> Result<Vec<Event>> {
        tracing::debug!(phase = %self.engine.phase(), "background transition");
        self.pause_and_save()
    }

    /// A call, alarm, or other transient interruption.
    pub fn handle_interruption(&mut self) -> Result<Vec<Event>> {
        tracing::debug!(phase = %self.engine.phase(), "interruption");
        self.pause_and_save()
    }

    /// The app is back. An idle engine (fresh launch) picks up the saved
    /// run; a live engine is kept paused and its snapshot refreshed.
    pub fn handle_foreground_transition(&mut self) -> Result<Vec<Event>> {
        if self.engine.phase().is_terminal() {
            return match self.restore_state()? {
                RestoreOutcome::Restored(events) => Ok(events),
                outcome => {
                    tracing::debug!(?outcome, "nothing restored on foreground");
                    Ok(Vec::new())
                }
            };
        }
        self.pause_and_save()
    }

    fn pause_and_save(&mut self) -> Result<Vec<Event>> {
        let events = if self.engine.phase().is_timed() && !self.engine.is_paused() {
            self.engine.pause()
        } else {
            Vec::new()
        };
        self.save_state()?;
        Ok(events)
    }
}
