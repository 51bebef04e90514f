//! Events that move a session between phases

use super::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration accepted (and the opening call, if any, returned)
    Started,
    /// A user turn got its reply; `evaluated` when a structured block was
    /// recognised in it
    TurnCompleted { evaluated: bool },
    /// Caller asked for a report
    ReportRequested,
    /// The report reply parsed
    ReportReady,
    /// The report call or its parse failed; go back to where we were
    ReportFailed { previous: Phase },
}
