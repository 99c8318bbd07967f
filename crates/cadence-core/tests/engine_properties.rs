//! Property tests for timing and refusal behaviour of the session engine.

use std::sync::Arc;

use cadence_core::storage::config::SessionConfig;
use cadence_core::{Event, ManualClock, Phase, PhaseSequence, RestKind, SessionEngine};
use proptest::prelude::*;

fn engine_with(config: &SessionConfig, clock: &ManualClock) -> SessionEngine {
    SessionEngine::new(PhaseSequence::focus(config)).with_clock(Arc::new(clock.clone()))
}

proptest! {
    #[test]
    fn pause_resume_preserves_remaining_time(
        work_secs in 60u64..7200,
        run_fraction in 0.0f64..0.99,
        pause_ms in 0i64..10_000_000,
    ) {
        let clock = ManualClock::default();
        let config = SessionConfig { work_secs, ..SessionConfig::default() };
        let mut engine = engine_with(&config, &clock);
        engine.start();

        let ran_ms = (work_secs as f64 * 1000.0 * run_fraction) as i64;
        clock.advance_ms(ran_ms);
        engine.tick();
        let before = engine.time_remaining_ms();

        engine.pause();
        clock.advance_ms(pause_ms);
        engine.tick();
        engine.resume();

        prop_assert_eq!(engine.time_remaining_ms(), before);
        prop_assert_eq!(engine.current_session_duration_ms(), Some(ran_ms as u64));
    }

    #[test]
    fn refused_operations_leave_state_unchanged(
        ran_secs in 0i64..1000,
        paused in any::<bool>(),
    ) {
        let clock = ManualClock::default();
        let mut engine = engine_with(&SessionConfig::default(), &clock);
        engine.start();
        clock.advance_secs(ran_secs);
        engine.tick();
        if paused {
            engine.pause();
        }

        let before = engine.status();
        let refused = if paused {
            vec![engine.pause(), engine.start(), engine.skip_rest(), engine.skip_prep()]
        } else {
            vec![engine.resume(), engine.start(), engine.skip_rest(), engine.skip_prep()]
        };
        prop_assert!(refused.iter().all(Vec::is_empty));
        prop_assert!(engine.last_rejection().is_some());
        prop_assert_eq!(engine.status(), before);
    }

    #[test]
    fn long_rest_comes_every_cycle_length_sessions(
        cycle_length in 1u32..=8,
        work_phases in 1usize..30,
    ) {
        let clock = ManualClock::default();
        let config = SessionConfig {
            work_secs: 60,
            short_rest_secs: 60,
            long_rest_secs: 60,
            sessions_per_cycle: cycle_length,
            prep_secs: 0,
        };
        let mut engine = engine_with(&config, &clock);
        engine.start();

        let mut long_rests = 0usize;
        for completed in 1..=work_phases {
            prop_assert_eq!(engine.phase(), Phase::Working);
            clock.advance_ms(engine.time_remaining_ms() as i64);
            let events = engine.tick();
            let took_long = events.iter().any(|e| matches!(
                e,
                Event::PhaseStarted { phase: Phase::Resting(RestKind::Long), .. }
            ));
            prop_assert_eq!(took_long, completed % cycle_length as usize == 0);
            if took_long {
                long_rests += 1;
            }
            clock.advance_ms(engine.time_remaining_ms() as i64);
            engine.tick();
        }
        prop_assert_eq!(long_rests, work_phases / cycle_length as usize);
    }
}
