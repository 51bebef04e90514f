//! API request and response types

use crate::engine::{EngineDef, EngineMode, ReportPolicy};
use crate::extract;
use crate::llm::MessageRole;
use crate::prompt::Settings;
use crate::session::{Session, Turn};
use crate::state_machine::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Request to run a single-shot engine
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub fields: Settings,
}

/// Request to start a conversational session
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub engine: String,
    #[serde(default, alias = "settings")]
    pub config: Settings,
}

/// Request to send a user turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// Catalog entry
#[derive(Debug, Serialize)]
pub struct EngineInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: &'static str,
    pub required_settings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_shape: Option<Value>,
}

impl From<&EngineDef> for EngineInfo {
    fn from(def: &EngineDef) -> Self {
        let report_mode = match &def.mode {
            EngineMode::Conversation(spec) => Some(match spec.report {
                ReportPolicy::Embedded(_) => "embedded",
                ReportPolicy::OnDemand { .. } => "on_demand",
            }),
            EngineMode::SingleShot(_) => None,
        };

        Self {
            id: def.id.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            kind: def.kind_name(),
            required_settings: def.required_settings(),
            report_mode,
            result_shape: def.result_shape.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnginesResponse {
    pub engines: Vec<EngineInfo>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub engine: String,
    pub result: Value,
}

/// A transcript entry as shown to the person
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: MessageRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Read-only view of a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub engine: String,
    pub phase: Phase,
    pub settings: Settings,
    pub messages: Vec<MessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub report_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        // Embedded blocks belong in `result`, not in the visible text
        let markers = match session.engine().conversation().map(|c| &c.report) {
            Some(ReportPolicy::Embedded(markers)) => Some(markers),
            _ => None,
        };

        Self {
            id: session.id(),
            engine: session.engine().id.clone(),
            phase: session.phase(),
            settings: session.settings().clone(),
            messages: session
                .visible_transcript()
                .map(|m| MessageView {
                    role: m.role,
                    content: match (m.role, markers) {
                        (MessageRole::Assistant, Some(markers)) => {
                            extract::extract_embedded(&m.content, markers).display_text
                        }
                        _ => m.content.clone(),
                    },
                    at: m.at,
                })
                .collect(),
            result: session.result().cloned().map(Value::Object),
            report_count: session.report_count(),
            created_at: session.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session: SessionView,
    /// The model's first turn, for engines that speak first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub display_text: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl From<Turn> for TurnResponse {
    fn from(turn: Turn) -> Self {
        Self {
            display_text: turn.display_text,
            phase: turn.phase,
            result: turn.result.map(Value::Object),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: Value,
    pub report_count: u32,
    pub phase: Phase,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
