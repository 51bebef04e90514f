//! Property-based tests for the phase state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::*;
use crate::engine::ReportPolicy;
use crate::extract::BlockMarkers;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Configuring),
        Just(Phase::Active),
        Just(Phase::AwaitingReport),
        Just(Phase::Evaluated),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Started),
        any::<bool>().prop_map(|evaluated| Event::TurnCompleted { evaluated }),
        Just(Event::ReportRequested),
        Just(Event::ReportReady),
        arb_phase().prop_map(|previous| Event::ReportFailed { previous }),
    ]
}

fn arb_policy() -> impl Strategy<Value = ReportPolicy> {
    prop_oneof![
        Just(ReportPolicy::Embedded(BlockMarkers::new("<<", ">>"))),
        Just(ReportPolicy::OnDemand {
            final_instruction: "Summarize.".to_string(),
            max_tokens: 100,
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Nothing ever returns a session to Configuring
    #[test]
    fn prop_never_back_to_configuring(
        policy in arb_policy(),
        events in proptest::collection::vec(arb_event(), 0..30),
    ) {
        let mut phase = Phase::Configuring;
        let mut started = false;

        for event in events {
            if let Ok(next) = transition(phase, &policy, event) {
                if started {
                    prop_assert_ne!(next, Phase::Configuring);
                }
                started |= next != Phase::Configuring;
                phase = next;
            }
        }
    }

    // Embedded policy: once evaluated, every event is rejected
    #[test]
    fn prop_embedded_evaluated_is_absorbing(event in arb_event()) {
        let policy = ReportPolicy::Embedded(BlockMarkers::new("<<", ">>"));
        prop_assert!(transition(Phase::Evaluated, &policy, event).is_err());
    }

    // Embedded policy never reaches AwaitingReport
    #[test]
    fn prop_embedded_never_awaits_report(
        events in proptest::collection::vec(arb_event(), 0..30),
    ) {
        let policy = ReportPolicy::Embedded(BlockMarkers::new("<<", ">>"));
        let mut phase = Phase::Configuring;
        for event in events {
            if let Ok(next) = transition(phase, &policy, event) {
                prop_assert_ne!(next, Phase::AwaitingReport);
                phase = next;
            }
        }
    }

    // Evaluated is only reachable from Active (detection) or AwaitingReport (report)
    #[test]
    fn prop_evaluated_has_a_source(
        policy in arb_policy(),
        phase in arb_phase(),
        event in arb_event(),
    ) {
        if let Ok(Phase::Evaluated) = transition(phase, &policy, event) {
            let from_detection = phase == Phase::Active
                && event == Event::TurnCompleted { evaluated: true };
            let from_report = phase == Phase::AwaitingReport
                && matches!(
                    event,
                    Event::ReportReady | Event::ReportFailed { previous: Phase::Evaluated }
                );
            prop_assert!(from_detection || from_report);
        }
    }

    // A failed report never invents a phase the session was not in
    #[test]
    fn prop_report_failure_restores(policy in arb_policy(), previous in arb_phase()) {
        match transition(Phase::AwaitingReport, &policy, Event::ReportFailed { previous }) {
            Ok(next) => prop_assert_eq!(next, previous),
            Err(_) => prop_assert!(matches!(previous, Phase::Configuring | Phase::AwaitingReport)),
        }
    }
}
