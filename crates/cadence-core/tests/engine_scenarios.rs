//! End-to-end runs of the session engine under a manual clock.

use std::sync::Arc;

use cadence_core::error::EngineError;
use cadence_core::feedback::{FeedbackHub, RecordingFeedback, SoundCue};
use cadence_core::recovery::{MemoryStore, RecoveryManager, RestoreOutcome};
use cadence_core::storage::config::{CircuitConfig, Exercise, RecoveryConfig, SessionConfig};
use cadence_core::{Clock, Event, ManualClock, Phase, PhaseSequence, RestKind, SessionEngine};

fn focus_engine(clock: &ManualClock) -> SessionEngine {
    SessionEngine::new(PhaseSequence::focus(&SessionConfig::default()))
        .with_clock(Arc::new(clock.clone()))
}

/// Let the current phase's timer run out and tick once.
fn run_out(engine: &mut SessionEngine, clock: &ManualClock) -> Vec<Event> {
    clock.advance_ms(engine.time_remaining_ms() as i64);
    engine.tick()
}

fn phases_started(events: &[Event]) -> Vec<Phase> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::PhaseStarted { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect()
}

#[test]
fn full_cycle_ends_with_long_rest_and_fresh_counters() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();
    assert_eq!(engine.phase(), Phase::Working);

    for session in 1..=4u32 {
        assert_eq!(engine.current_session_number(), session);
        assert_eq!(engine.time_remaining_ms(), 25 * 60 * 1000);
        run_out(&mut engine, &clock);
        assert_eq!(engine.sessions_completed_in_cycle(), session);
        let expected = if session == 4 {
            Phase::Resting(RestKind::Long)
        } else {
            Phase::Resting(RestKind::Short)
        };
        assert_eq!(engine.phase(), expected);
        run_out(&mut engine, &clock);
    }

    assert_eq!(engine.phase(), Phase::Working);
    assert_eq!(engine.current_session_number(), 1);
    assert_eq!(engine.sessions_completed_in_cycle(), 0);
    assert_eq!(engine.round(), 2);
}

#[test]
fn phase_order_follows_the_cycle() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    let mut visited = phases_started(&engine.start());
    for _ in 0..8 {
        visited.extend(phases_started(&run_out(&mut engine, &clock)));
    }
    let short = Phase::Resting(RestKind::Short);
    let long = Phase::Resting(RestKind::Long);
    assert_eq!(
        visited,
        vec![
            Phase::Working,
            short,
            Phase::Working,
            short,
            Phase::Working,
            short,
            Phase::Working,
            long,
            Phase::Working,
        ]
    );
}

#[test]
fn restart_after_stop_behaves_like_first_start() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();
    let first_run = engine.run_id();
    engine.stop();

    clock.advance_secs(10);
    let second_start = clock.now();
    let events = engine.start();
    assert!(matches!(events[0], Event::RunStarted { .. }));
    assert_eq!(engine.phase(), Phase::Working);
    assert_eq!(engine.current_session_number(), 1);
    assert_eq!(engine.sessions_completed_in_cycle(), 0);
    assert_eq!(engine.session_start_time(), Some(second_start));
    assert_eq!(engine.current_session_duration_ms(), Some(0));
    assert_ne!(engine.run_id(), first_run);
}

#[test]
fn long_pause_does_not_consume_phase_time() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();
    clock.advance_secs(15 * 60);
    engine.tick();
    assert_eq!(engine.time_remaining_ms(), 600_000);

    engine.pause();
    clock.advance_secs(3600);
    assert!(engine.tick().is_empty());
    engine.resume();
    assert_eq!(engine.time_remaining_ms(), 600_000);
    assert_eq!(engine.current_session_duration_ms(), Some(15 * 60 * 1000));
}

#[test]
fn stale_snapshot_is_not_restored() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();
    run_out(&mut engine, &clock);
    clock.advance_secs(180);
    engine.tick();
    assert_eq!(engine.phase(), Phase::Resting(RestKind::Short));
    assert_eq!(engine.time_remaining_ms(), 120_000);

    let manager = RecoveryManager::new(MemoryStore::new(), &RecoveryConfig::default());
    assert!(manager.save_state(&engine).unwrap());

    let mut relaunched = focus_engine(&clock);
    clock.advance_secs(3 * 3600);
    let outcome = manager.restore_state(&mut relaunched).unwrap();
    assert_eq!(outcome, RestoreOutcome::Stale { age_secs: 3 * 3600 });
    assert_eq!(relaunched.phase(), Phase::Idle);
    assert!(matches!(
        relaunched.last_rejection(),
        Some(EngineError::StaleRecoverySnapshot { .. })
    ));
    assert!(manager.peek().unwrap().is_none());
}

#[test]
fn skipping_a_rest_lands_where_waiting_would() {
    let clock_a = ManualClock::default();
    let clock_b = ManualClock::default();
    let mut waited = focus_engine(&clock_a);
    let mut skipped = focus_engine(&clock_b);
    for (engine, clock) in [(&mut waited, &clock_a), (&mut skipped, &clock_b)] {
        engine.start();
        run_out(engine, clock);
    }

    run_out(&mut waited, &clock_a);
    let events = skipped.skip_rest();
    assert!(matches!(
        events[0],
        Event::PhaseCompleted { skipped: true, .. }
    ));

    assert_eq!(waited.phase(), skipped.phase());
    assert_eq!(waited.current_session_number(), skipped.current_session_number());
    assert_eq!(
        waited.sessions_completed_in_cycle(),
        skipped.sessions_completed_in_cycle()
    );
}

#[test]
fn stop_clears_everything_from_any_phase() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();
    run_out(&mut engine, &clock);
    run_out(&mut engine, &clock);
    engine.pause();
    let events = engine.stop();
    assert!(matches!(events[0], Event::RunStopped { .. }));

    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(engine.time_remaining_ms(), 0);
    assert_eq!(engine.current_session_number(), 1);
    assert_eq!(engine.sessions_completed_in_cycle(), 0);
    assert_eq!(engine.current_session_duration_ms(), None);
    assert!(!engine.is_paused());
}

fn small_circuit(rounds: u32) -> CircuitConfig {
    CircuitConfig {
        work_secs: 30,
        rest_secs: 10,
        round_rest_secs: 60,
        rounds,
        prep_secs: 10,
        exercises: vec![
            Exercise::new("Squats"),
            Exercise {
                name: "Plank".into(),
                work_secs: Some(45),
            },
        ],
    }
}

#[test]
fn circuit_runs_all_rounds_then_completes() {
    let clock = ManualClock::default();
    let feedback = RecordingFeedback::new();
    let mut engine = SessionEngine::new(PhaseSequence::circuit(&small_circuit(2)))
        .with_clock(Arc::new(clock.clone()))
        .with_feedback(FeedbackHub::new(
            Arc::new(feedback.clone()),
            Arc::new(feedback.clone()),
        ));

    let mut events = engine.start();
    assert_eq!(engine.phase(), Phase::Preparing);
    while !engine.phase().is_terminal() {
        events.extend(run_out(&mut engine, &clock));
    }
    assert_eq!(engine.phase(), Phase::Completed);

    let work_labels: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::PhaseStarted {
                phase: Phase::Working,
                label,
                ..
            } => Some(label.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(work_labels, vec!["Squats", "Plank", "Squats", "Plank"]);

    let plank = events.iter().find_map(|e| match e {
        Event::PhaseStarted {
            label, duration_ms, ..
        } if label == "Plank" => Some(*duration_ms),
        _ => None,
    });
    assert_eq!(plank, Some(45_000));

    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::CycleCompleted { .. }))
            .count(),
        1
    );
    assert!(matches!(events.last(), Some(Event::RunCompleted { .. })));

    let sounds = feedback.sounds();
    assert_eq!(sounds.first(), Some(&SoundCue::Prepare));
    assert_eq!(sounds.last(), Some(&SoundCue::Completion));

    // A finished workout can be started again.
    engine.start();
    assert_eq!(engine.phase(), Phase::Preparing);
    assert_eq!(engine.round(), 1);
}

#[test]
fn reconfiguring_mid_run_waits_for_the_run_to_end() {
    let clock = ManualClock::default();
    let mut engine = focus_engine(&clock);
    engine.start();

    let shorter = SessionConfig {
        work_secs: 600,
        ..SessionConfig::default()
    };
    let events = engine.configure_durations(&shorter);
    assert!(matches!(events[0], Event::ConfigurationDeferred { .. }));
    assert_eq!(engine.phase_duration_ms(), 25 * 60 * 1000);

    run_out(&mut engine, &clock);
    run_out(&mut engine, &clock);
    assert_eq!(engine.phase_duration_ms(), 25 * 60 * 1000);

    let events = engine.stop();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ConfigurationApplied { .. })));
    engine.start();
    assert_eq!(engine.phase_duration_ms(), 600_000);
}

#[test]
fn countdown_cues_fire_in_the_last_seconds() {
    let clock = ManualClock::default();
    let feedback = RecordingFeedback::new();
    let sequence = PhaseSequence::focus(&SessionConfig {
        work_secs: 60,
        ..SessionConfig::default()
    });
    let mut engine = SessionEngine::new(sequence)
        .with_clock(Arc::new(clock.clone()))
        .with_feedback(FeedbackHub::new(
            Arc::new(feedback.clone()),
            Arc::new(feedback.clone()),
        ));
    engine.start();
    feedback.clear();

    clock.advance_secs(50);
    engine.tick();
    assert!(feedback.sounds().is_empty());

    for _ in 0..36 {
        clock.advance_ms(250);
        engine.tick();
    }
    let ticks = feedback
        .sounds()
        .into_iter()
        .filter(|s| *s == SoundCue::CountdownTick)
        .count();
    assert_eq!(ticks, 3);
}
