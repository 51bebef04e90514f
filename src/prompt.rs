//! Prompt composition
//!
//! Builds the exact system instruction and message list sent for a turn.
//! Pure: the same inputs always produce the same request.

mod template;

pub use template::{Settings, Template};

use crate::llm::{LlmMessage, MessageRole};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised before any network call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("missing required setting: {key}")]
    MissingKey { key: String },
    #[error("template placeholder {{{{{key}}}}} is not declared")]
    UndeclaredPlaceholder { key: String },
    #[error("invalid transcript: {reason}")]
    InvalidTranscript { reason: String },
}

/// One turn of dialogue as the session records it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Sent to the model but never shown to the person in the session
    pub hidden: bool,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content, false)
    }

    /// A user message the model sees but the person never does
    pub fn hidden_user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, true)
    }

    fn new(role: MessageRole, content: impl Into<String>, hidden: bool) -> Self {
        Self {
            role,
            content: content.into(),
            hidden,
            at: Utc::now(),
        }
    }

    fn to_llm(&self) -> LlmMessage {
        LlmMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The outbound half of a turn
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub system: String,
    pub messages: Vec<LlmMessage>,
}

/// Render a session's system instruction. Done once, at session start.
pub fn render_system(template: &Template, settings: &Settings) -> Result<String, PromptError> {
    template.render(settings)
}

/// Build the request for the next completion.
///
/// `transcript` must already end with the user message being answered,
/// unless `final_instruction` is given, in which case it must end with an
/// assistant message and the instruction is appended as the closing user
/// turn. The instruction never enters the transcript itself.
pub fn compose(
    system: &str,
    transcript: &[Message],
    final_instruction: Option<&str>,
) -> Result<ComposedPrompt, PromptError> {
    let mut messages: Vec<LlmMessage> = transcript.iter().map(Message::to_llm).collect();
    if let Some(instruction) = final_instruction {
        messages.push(LlmMessage::user(instruction));
    }

    check_alternation(&messages)?;

    Ok(ComposedPrompt {
        system: system.to_string(),
        messages,
    })
}

/// Outbound messages must start with a user turn, alternate, and end on a
/// user turn awaiting a reply.
fn check_alternation(messages: &[LlmMessage]) -> Result<(), PromptError> {
    let invalid = |reason: String| Err(PromptError::InvalidTranscript { reason });

    match (messages.first(), messages.last()) {
        (None, _) | (_, None) => return invalid("no messages to send".to_string()),
        (Some(first), _) if first.role != MessageRole::User => {
            return invalid("first message must come from the user".to_string())
        }
        (_, Some(last)) if last.role != MessageRole::User => {
            return invalid("last message must come from the user".to_string())
        }
        _ => {}
    }

    if let Some(index) = messages
        .windows(2)
        .position(|pair| pair[0].role == pair[1].role)
    {
        return invalid(format!(
            "messages {} and {} are both from the {}",
            index,
            index + 1,
            messages[index].role.as_str()
        ));
    }

    Ok(())
}
