//! Pure phase transition function
//!
//! Given the same phase, policy and event this always yields the same
//! result. The session runner performs the I/O around it.

use super::{Event, Phase};
use crate::engine::ReportPolicy;
use thiserror::Error;

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session has ended with an evaluation; start a new session to continue")]
    SessionClosed,
    #[error("session has not started")]
    NotStarted,
    #[error("a report is already being generated")]
    ReportInProgress,
    #[error("no conversation yet to report on")]
    NoExchange,
    #[error("this engine reports inside the conversation and cannot be asked for a report")]
    ReportNotSupported,
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    phase: Phase,
    policy: &ReportPolicy,
    event: Event,
) -> Result<Phase, TransitionError> {
    match (phase, event) {
        // ============================================================
        // Start
        // ============================================================
        (Phase::Configuring, Event::Started) => Ok(Phase::Active),

        // ============================================================
        // Conversational turns
        // ============================================================

        // Embedded policy: a recognised block ends the session
        (Phase::Active, Event::TurnCompleted { evaluated: true }) if policy.is_terminal() => {
            Ok(Phase::Evaluated)
        }

        // On-demand engines only evaluate through reports; stray blocks are just text
        (Phase::Active, Event::TurnCompleted { .. }) => Ok(Phase::Active),

        // On-demand: chatting after a report reopens the conversation
        (Phase::Evaluated, Event::TurnCompleted { .. }) if !policy.is_terminal() => {
            Ok(Phase::Active)
        }

        (Phase::Evaluated, Event::TurnCompleted { .. }) => Err(TransitionError::SessionClosed),

        (Phase::Configuring, Event::TurnCompleted { .. }) => Err(TransitionError::NotStarted),

        (Phase::AwaitingReport, Event::TurnCompleted { .. } | Event::ReportRequested) => {
            Err(TransitionError::ReportInProgress)
        }

        // ============================================================
        // Reports
        // ============================================================
        (_, Event::ReportRequested) if policy.is_terminal() => {
            Err(TransitionError::ReportNotSupported)
        }

        (Phase::Configuring, Event::ReportRequested) => Err(TransitionError::NoExchange),

        (Phase::Active | Phase::Evaluated, Event::ReportRequested) => Ok(Phase::AwaitingReport),

        (Phase::AwaitingReport, Event::ReportReady) => Ok(Phase::Evaluated),

        (Phase::AwaitingReport, Event::ReportFailed { previous })
            if matches!(previous, Phase::Active | Phase::Evaluated) =>
        {
            Ok(previous)
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {phase:?} with event {event:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BlockMarkers;

    fn embedded() -> ReportPolicy {
        ReportPolicy::Embedded(BlockMarkers::new("<<", ">>"))
    }

    fn on_demand() -> ReportPolicy {
        ReportPolicy::OnDemand {
            final_instruction: "Summarize.".to_string(),
            max_tokens: 100,
        }
    }

    #[test]
    fn test_start_activates() {
        assert_eq!(
            transition(Phase::Configuring, &embedded(), Event::Started),
            Ok(Phase::Active)
        );
    }

    #[test]
    fn test_embedded_detection_evaluates() {
        assert_eq!(
            transition(
                Phase::Active,
                &embedded(),
                Event::TurnCompleted { evaluated: true }
            ),
            Ok(Phase::Evaluated)
        );
        assert_eq!(
            transition(
                Phase::Active,
                &embedded(),
                Event::TurnCompleted { evaluated: false }
            ),
            Ok(Phase::Active)
        );
    }

    #[test]
    fn test_embedded_evaluated_is_terminal() {
        assert_eq!(
            transition(
                Phase::Evaluated,
                &embedded(),
                Event::TurnCompleted { evaluated: false }
            ),
            Err(TransitionError::SessionClosed)
        );
    }

    #[test]
    fn test_embedded_rejects_reports() {
        assert_eq!(
            transition(Phase::Active, &embedded(), Event::ReportRequested),
            Err(TransitionError::ReportNotSupported)
        );
    }

    #[test]
    fn test_on_demand_ignores_blocks_in_turns() {
        assert_eq!(
            transition(
                Phase::Active,
                &on_demand(),
                Event::TurnCompleted { evaluated: true }
            ),
            Ok(Phase::Active)
        );
    }

    #[test]
    fn test_on_demand_report_cycle() {
        let policy = on_demand();
        let awaiting = transition(Phase::Active, &policy, Event::ReportRequested).unwrap();
        assert_eq!(awaiting, Phase::AwaitingReport);

        let evaluated = transition(awaiting, &policy, Event::ReportReady).unwrap();
        assert_eq!(evaluated, Phase::Evaluated);

        // Continue chatting, then report again
        let active = transition(evaluated, &policy, Event::TurnCompleted { evaluated: false })
            .unwrap();
        assert_eq!(active, Phase::Active);
        assert_eq!(
            transition(evaluated, &policy, Event::ReportRequested),
            Ok(Phase::AwaitingReport)
        );
    }

    #[test]
    fn test_report_failure_restores_previous_phase() {
        for previous in [Phase::Active, Phase::Evaluated] {
            assert_eq!(
                transition(
                    Phase::AwaitingReport,
                    &on_demand(),
                    Event::ReportFailed { previous }
                ),
                Ok(previous)
            );
        }
    }

    #[test]
    fn test_report_before_start_fails() {
        assert_eq!(
            transition(Phase::Configuring, &on_demand(), Event::ReportRequested),
            Err(TransitionError::NoExchange)
        );
    }

    #[test]
    fn test_busy_while_awaiting_report() {
        assert_eq!(
            transition(
                Phase::AwaitingReport,
                &on_demand(),
                Event::TurnCompleted { evaluated: false }
            ),
            Err(TransitionError::ReportInProgress)
        );
    }

    #[test]
    fn test_double_start_is_invalid() {
        assert!(matches!(
            transition(Phase::Active, &on_demand(), Event::Started),
            Err(TransitionError::InvalidTransition(_))
        ));
    }
}
