use std::sync::Arc;

use clap::{Args, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

use cadence_core::feedback::{FeedbackHub, NoopFeedback};
use cadence_core::recovery::{RecoveryManager, RestoreOutcome};
use cadence_core::storage::Database;
use cadence_core::{Command, Config, Event, PhaseSequence, Session, SessionEngine, SessionRunner};

use crate::feedback::TerminalBell;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Preset {
    /// Work and rest cycles from `[session]`
    Focus,
    /// Rounds over the `[circuit]` exercise list
    Workout,
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = Preset::Focus)]
    preset: Preset,
    /// Continue the run saved by an earlier interrupted `run`
    #[arg(long)]
    resume: bool,
    /// Also print tick events
    #[arg(long)]
    ticks: bool,
}

/// One line typed on stdin.
enum Input {
    Send(Command),
    Status,
    Quit,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line {
        "pause" => Input::Send(Command::Pause),
        "resume" => Input::Send(Command::Resume),
        "skip" => Input::Send(Command::Skip),
        "skip-prep" => Input::Send(Command::SkipPrep),
        "skip-rest" => Input::Send(Command::SkipRest),
        "stop" => Input::Send(Command::Stop),
        "reset" => Input::Send(Command::Reset),
        "background" => Input::Send(Command::Background),
        "foreground" => Input::Send(Command::Foreground),
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown,
    }
}

pub fn run(args: RunArgs) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(args))
}

async fn drive(args: RunArgs) -> CliResult {
    let config = Config::load()?;
    let sequence = match args.preset {
        Preset::Focus => PhaseSequence::focus(&config.session),
        Preset::Workout => PhaseSequence::circuit(&config.circuit),
    };
    let feedback = FeedbackHub::new(Arc::new(NoopFeedback), Arc::new(TerminalBell))
        .configured(&config.feedback);
    let engine = SessionEngine::new(sequence).with_feedback(feedback);
    let recovery = RecoveryManager::new(Database::open()?, &config.recovery);
    let mut session = Session::new(engine, recovery);

    let first = if args.resume {
        match session.restore_state()? {
            RestoreOutcome::Restored(events) => {
                for event in &events {
                    print_event(event)?;
                }
                Command::Resume
            }
            outcome => {
                eprintln!("nothing to resume ({outcome:?})");
                return Ok(());
            }
        }
    } else {
        Command::Start
    };

    let history = Database::open()?;
    let handle = SessionRunner::new(session, &config.runtime)
        .with_hook(Box::new(move |event: &Event| {
            if let Err(e) = history.record_event(event) {
                tracing::warn!(error = %e, kind = event.kind(), "failed to record event");
            }
        }))
        .spawn();
    let mut events = handle.subscribe();
    handle.send(first).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if show(&event, args.ticks) {
                        print_event(&event)?;
                    }
                    if ends_run(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => match parse_input(line.trim()) {
                    Input::Send(command) => handle.send(command).await?,
                    Input::Status => print_event(&Event::StateSnapshot(handle.status()))?,
                    Input::Quit => {
                        handle.send(Command::Background).await?;
                        break;
                    }
                    Input::Unknown => eprintln!("unknown command: {}", line.trim()),
                },
                // Closed stdin leaves the run resumable, like `quit`.
                None => {
                    handle.send(Command::Background).await?;
                    break;
                }
            },
            signal = &mut ctrl_c => {
                signal?;
                handle.send(Command::Interruption).await?;
                break;
            }
        }
    }

    handle.shutdown().await?;
    drain(&mut events, args.ticks)?;
    Ok(())
}

/// Print whatever the runner published before it shut down.
fn drain(events: &mut Receiver<Event>, ticks: bool) -> CliResult {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if show(&event, ticks) {
                    print_event(&event)?;
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

fn show(event: &Event, ticks: bool) -> bool {
    ticks || !matches!(event, Event::Tick { .. })
}

fn ends_run(event: &Event) -> bool {
    matches!(event, Event::RunCompleted { .. } | Event::RunStopped { .. })
}

fn print_event(event: &Event) -> CliResult {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
