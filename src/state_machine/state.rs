//! Session lifecycle phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, no turns yet
    Configuring,
    /// Conversational turns being exchanged
    Active,
    /// A report call is in flight
    AwaitingReport,
    /// A structured result is available
    Evaluated,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Configuring => "configuring",
            Phase::Active => "active",
            Phase::AwaitingReport => "awaiting_report",
            Phase::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
