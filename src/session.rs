//! Multi-turn dialogue sessions
//!
//! A `Session` is a plain value owned by the caller. `SessionRunner` advances
//! it one turn at a time: compose the prompt, make one gateway call, classify
//! the reply, and only then commit the new turns and phase. Any error leaves
//! the session exactly as it was, so the caller can retry.

use crate::engine::{ConversationSpec, EngineDef, ReportPolicy};
use crate::extract::{self, StructuredResult};
use crate::gateway::{CompletionGateway, GatewayError};
use crate::llm::{LlmError, MessageRole};
use crate::prompt::{self, Message, PromptError, Settings};
use crate::state_machine::{transition, Event, Phase, TransitionError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] PromptError),
    #[error("transport error: {0}")]
    Transport(LlmError),
    #[error("rate limited: {0}")]
    RateLimited(LlmError),
    #[error("reply could not be parsed as a report: {reason}")]
    MalformedReply { reason: String, raw: String },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("engine {engine} is not a {expected} engine")]
    WrongEngineKind {
        engine: String,
        expected: &'static str,
    },
    #[error("message must not be empty")]
    EmptyMessage,
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(e) => SessionError::Transport(e),
            GatewayError::RateLimited(e) => SessionError::RateLimited(e),
        }
    }
}

/// One interactive run of a conversational engine
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    engine: Arc<EngineDef>,
    conversation: ConversationSpec,
    settings: Settings,
    system: String,
    transcript: Vec<Message>,
    phase: Phase,
    result: Option<StructuredResult>,
    reports: u32,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Validate settings and render the system instruction. The session
    /// starts in `Configuring`; nothing is sent yet.
    pub fn configure(engine: Arc<EngineDef>, settings: Settings) -> Result<Self, SessionError> {
        let Some(conversation) = engine.conversation().cloned() else {
            return Err(SessionError::WrongEngineKind {
                engine: engine.id.clone(),
                expected: "conversation",
            });
        };
        engine.validate_settings(&settings)?;
        let system = prompt::render_system(&engine.system, &settings)?;

        Ok(Self {
            id: Uuid::new_v4(),
            engine,
            conversation,
            settings,
            system,
            transcript: Vec::new(),
            phase: Phase::Configuring,
            result: None,
            reports: 0,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> &EngineDef {
        &self.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[allow(dead_code)] // Read by tests
    pub fn system_instruction(&self) -> &str {
        &self.system
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every turn, including hidden ones the model saw
    #[allow(dead_code)] // Read by tests
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Turns meant for the person in the session
    pub fn visible_transcript(&self) -> impl Iterator<Item = &Message> {
        self.transcript.iter().filter(|m| !m.hidden)
    }

    /// Latest structured result, if any
    pub fn result(&self) -> Option<&StructuredResult> {
        self.result.as_ref()
    }

    /// Number of on-demand reports generated so far
    pub fn report_count(&self) -> u32 {
        self.reports
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn spec(&self) -> &ConversationSpec {
        &self.conversation
    }

    fn has_exchange(&self) -> bool {
        self.transcript
            .iter()
            .any(|m| m.role == MessageRole::User && !m.hidden)
            && self
                .transcript
                .last()
                .is_some_and(|m| m.role == MessageRole::Assistant)
    }
}

/// Outcome of one conversational turn
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// What to show the person: the reply without any structured block
    pub display_text: String,
    pub phase: Phase,
    /// Structured result recognised in this turn's reply
    pub result: Option<StructuredResult>,
}

/// Drives sessions against the completion gateway
#[derive(Clone)]
pub struct SessionRunner {
    gateway: CompletionGateway,
}

impl SessionRunner {
    pub fn new(gateway: CompletionGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    /// Configure and start in one step
    pub async fn open(
        &self,
        engine: Arc<EngineDef>,
        settings: Settings,
    ) -> Result<(Session, Option<String>), SessionError> {
        let mut session = Session::configure(engine, settings)?;
        let opening = self.start(&mut session).await?;
        Ok((session, opening))
    }

    /// Move a configured session to `Active`.
    ///
    /// Engines with an opening make one call first so the session begins
    /// with the model's turn; that text is returned for display.
    pub async fn start(&self, session: &mut Session) -> Result<Option<String>, SessionError> {
        let spec = session.spec();
        let next = transition(session.phase, &spec.report, Event::Started)?;

        let Some(kickoff) = spec.opening.clone() else {
            session.phase = next;
            tracing::debug!(session = %session.id, engine = %session.engine.id, "Session started");
            return Ok(None);
        };

        let max_tokens = spec.turn_max_tokens;
        let mut candidate = session.transcript.clone();
        candidate.push(Message::hidden_user(kickoff));
        let composed = prompt::compose(&session.system, &candidate, None)?;

        let raw = self
            .gateway
            .complete(Some(&composed.system), &composed.messages, max_tokens)
            .await?;
        let display_text = raw.trim().to_string();

        candidate.push(Message::assistant(raw));
        session.transcript = candidate;
        session.phase = next;
        tracing::debug!(
            session = %session.id,
            engine = %session.engine.id,
            "Session started with opening turn"
        );

        Ok(Some(display_text))
    }

    /// Send one user utterance and record the reply.
    ///
    /// For engines with embedded reports, a well-formed block in the reply
    /// evaluates the session and is stripped from `display_text`. A missing,
    /// unterminated or unparsable block is ordinary dialogue.
    pub async fn advance(
        &self,
        session: &mut Session,
        utterance: &str,
    ) -> Result<Turn, SessionError> {
        if utterance.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let spec = session.spec();
        // Reject closed or unstarted sessions before spending a call
        transition(session.phase, &spec.report, Event::TurnCompleted { evaluated: false })?;

        let max_tokens = spec.turn_max_tokens;
        let mut candidate = session.transcript.clone();
        candidate.push(Message::user(utterance));
        let composed = prompt::compose(&session.system, &candidate, None)?;

        let raw = self
            .gateway
            .complete(Some(&composed.system), &composed.messages, max_tokens)
            .await?;

        let spec = session.spec();
        let extraction = match &spec.report {
            ReportPolicy::Embedded(markers) => extract::extract_embedded(&raw, markers),
            ReportPolicy::OnDemand { .. } => extract::Extraction {
                display_text: raw.trim().to_string(),
                result: None,
            },
        };
        let next = transition(
            session.phase,
            &spec.report,
            Event::TurnCompleted {
                evaluated: extraction.result.is_some(),
            },
        )?;

        candidate.push(Message::assistant(raw));
        session.transcript = candidate;
        if next != session.phase {
            tracing::debug!(
                session = %session.id,
                from = %session.phase,
                to = %next,
                "Phase changed"
            );
        }
        session.phase = next;
        if let Some(result) = &extraction.result {
            session.result = Some(result.clone());
        }

        Ok(Turn {
            display_text: extraction.display_text,
            phase: next,
            result: extraction.result,
        })
    }

    /// Ask for a full report on the conversation so far.
    ///
    /// The final instruction is sent after the transcript but never stored
    /// in it. The whole reply must be one JSON object. On any failure the
    /// session keeps its previous phase and transcript.
    pub async fn request_report(
        &self,
        session: &mut Session,
    ) -> Result<StructuredResult, SessionError> {
        let spec = session.spec();
        let previous = session.phase;
        let awaiting = transition(previous, &spec.report, Event::ReportRequested)?;

        let ReportPolicy::OnDemand {
            final_instruction,
            max_tokens,
        } = &spec.report
        else {
            return Err(TransitionError::ReportNotSupported.into());
        };
        if !session.has_exchange() {
            return Err(TransitionError::NoExchange.into());
        }

        let max_tokens = *max_tokens;
        let composed = prompt::compose(
            &session.system,
            &session.transcript,
            Some(final_instruction.as_str()),
        )?;

        tracing::debug!(
            session = %session.id,
            from = %previous,
            to = %awaiting,
            "Report requested"
        );
        let raw = match self
            .gateway
            .complete(Some(&composed.system), &composed.messages, max_tokens)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                restore(session, awaiting, previous)?;
                return Err(e.into());
            }
        };

        let report = match extract::parse_payload(&raw) {
            Ok(report) => report,
            Err(e) => {
                restore(session, awaiting, previous)?;
                return Err(SessionError::MalformedReply {
                    reason: e.to_string(),
                    raw,
                });
            }
        };

        session.phase = transition(awaiting, &session.spec().report, Event::ReportReady)?;
        session.result = Some(report.clone());
        session.reports += 1;
        tracing::debug!(session = %session.id, reports = session.reports, "Report generated");

        Ok(report)
    }
}

fn restore(session: &mut Session, awaiting: Phase, previous: Phase) -> Result<(), SessionError> {
    session.phase = transition(awaiting, &session.spec().report, Event::ReportFailed { previous })?;
    Ok(())
}
