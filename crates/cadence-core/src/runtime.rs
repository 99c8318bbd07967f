//! Async driver for a [`Session`].
//!
//! A runner task owns the session and is the only thing that touches the
//! engine. Callers talk to it through a [`SessionHandle`]: commands go in
//! over an mpsc channel, engine events come out on a broadcast channel and
//! the latest [`EngineStatus`] is kept in a watch channel.
//!
//! While the current phase's countdown is live a [`Ticker`] task sends
//! [`TimerSignal`]s tagged with the timer generation it was started for.
//! The ticker is replaced whenever the generation changes and dropped
//! while the timer is paused or stopped.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{CoreError, Result};
use crate::events::{EngineStatus, Event};
use crate::recovery::SnapshotStore;
use crate::session::Session;
use crate::storage::config::RuntimeConfig;
use crate::timer::{PhaseSequence, TimerSignal};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;
const SIGNAL_BUFFER: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Skip,
    SkipPrep,
    SkipRest,
    Stop,
    Reset,
    Configure(PhaseSequence),
    Background,
    Foreground,
    Interruption,
    Shutdown,
}

/// Called with every event before it is broadcast.
pub type EventHook = Box<dyn FnMut(&Event) + Send>;

/// Periodic [`TimerSignal`] source for one timer generation.
///
/// The task is aborted when the `Ticker` is dropped.
pub struct Ticker {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn(generation: u64, period: Duration, signals: mpsc::Sender<TimerSignal>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                match signals.try_send(TimerSignal { generation }) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The task side: owns the session until shutdown.
pub struct SessionRunner<S> {
    session: Session<S>,
    tick_interval: Duration,
    hook: Option<EventHook>,
}

impl<S> SessionRunner<S>
where
    S: SnapshotStore + Send + 'static,
{
    pub fn new(session: Session<S>, config: &RuntimeConfig) -> Self {
        Self {
            session,
            tick_interval: config.tick_interval(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: EventHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Spawn the runner onto the current tokio runtime.
    pub fn spawn(self) -> SessionHandle<S> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (status_tx, status_rx) = watch::channel(self.session.engine().status());
        let task = tokio::spawn(self.run(command_rx, event_tx.clone(), status_tx));
        SessionHandle {
            commands: command_tx,
            events: event_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: broadcast::Sender<Event>,
        status: watch::Sender<EngineStatus>,
    ) -> Session<S> {
        let (signal_tx, mut signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let mut ticker: Option<Ticker> = None;
        tracing::debug!(tick_ms = self.tick_interval.as_millis() as u64, "session runner started");

        loop {
            self.sync_ticker(&mut ticker, &signal_tx);

            let produced = tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command),
                },
                Some(signal) = signal_rx.recv() => {
                    self.session.engine_mut().handle_signal(signal)
                }
            };
            self.publish(produced, &events, &status);
        }

        drop(ticker);
        tracing::debug!("session runner stopped");
        self.session
    }

    fn sync_ticker(&self, ticker: &mut Option<Ticker>, signals: &mpsc::Sender<TimerSignal>) {
        let engine = self.session.engine();
        if !engine.is_timer_running() {
            if ticker.take().is_some() {
                tracing::trace!("ticker dropped");
            }
            return;
        }
        let generation = engine.timer_generation();
        if ticker.as_ref().map(Ticker::generation) != Some(generation) {
            tracing::trace!(generation, "ticker spawned");
            *ticker = Some(Ticker::spawn(generation, self.tick_interval, signals.clone()));
        }
    }

    fn apply(&mut self, command: Command) -> Vec<Event> {
        let engine = self.session.engine_mut();
        let lifecycle = match command {
            Command::Start => return engine.start(),
            Command::Pause => return engine.pause(),
            Command::Resume => return engine.resume(),
            Command::Skip => return engine.skip(),
            Command::SkipPrep => return engine.skip_prep(),
            Command::SkipRest => return engine.skip_rest(),
            Command::Stop => return engine.stop(),
            Command::Reset => return engine.reset(),
            Command::Configure(sequence) => return engine.configure(sequence),
            Command::Background => self.session.handle_background_transition(),
            Command::Foreground => self.session.handle_foreground_transition(),
            Command::Interruption => self.session.handle_interruption(),
            Command::Shutdown => return Vec::new(),
        };
        lifecycle.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "lifecycle transition failed");
            Vec::new()
        })
    }

    fn publish(
        &mut self,
        produced: Vec<Event>,
        events: &broadcast::Sender<Event>,
        status: &watch::Sender<EngineStatus>,
    ) {
        if produced.is_empty() {
            return;
        }
        let run_ended = produced.iter().any(|event| {
            matches!(
                event,
                Event::RunCompleted { .. } | Event::RunStopped { .. } | Event::EngineReset { .. }
            )
        });
        if run_ended {
            if let Err(e) = self.session.recovery().discard() {
                tracing::warn!(error = %e, "failed to clear recovery snapshot");
            }
        }
        for event in produced {
            if let Some(hook) = self.hook.as_mut() {
                hook(&event);
            }
            // No subscribers is fine.
            let _ = events.send(event);
        }
        status.send_replace(self.session.engine().status());
    }
}

/// The caller side of a running [`SessionRunner`].
pub struct SessionHandle<S> {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
    status: watch::Receiver<EngineStatus>,
    task: JoinHandle<Session<S>>,
}

impl<S> SessionHandle<S> {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::RunnerClosed)
    }

    /// A sender for use from other tasks (signal handlers, input loops).
    pub fn commander(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Stop the runner and take the session back.
    pub async fn shutdown(self) -> Result<Session<S>> {
        // Already gone is fine; the join below reports how it ended.
        let _ = self.commands.send(Command::Shutdown).await;
        self.task
            .await
            .map_err(|e| CoreError::Custom(format!("session runner panicked: {e}")))
    }
}
