//! Completion gateway
//!
//! Exactly one round trip to the completion provider per call. No retries,
//! no state between calls; failures come back classified but otherwise
//! untouched.

use crate::llm::{LlmError, LlmErrorKind, LlmMessage, LlmRequest, LlmService};
use std::sync::Arc;
use thiserror::Error;

/// Model used when nothing else is configured
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Failure of a single gateway call
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(LlmError),
    #[error("rate limited: {0}")]
    RateLimited(LlmError),
}

impl From<LlmError> for GatewayError {
    fn from(err: LlmError) -> Self {
        match err.kind {
            LlmErrorKind::RateLimit => GatewayError::RateLimited(err),
            _ => GatewayError::Transport(err),
        }
    }
}

/// Thin wrapper over the provider that returns raw reply text
#[derive(Clone)]
pub struct CompletionGateway {
    service: Arc<dyn LlmService>,
}

impl CompletionGateway {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Send one request and return the first text segment, untrimmed.
    ///
    /// A reply whose first segment is missing or only whitespace is a
    /// transport failure; it would otherwise become an empty turn.
    pub async fn complete(
        &self,
        system: Option<&str>,
        messages: &[LlmMessage],
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let request = LlmRequest {
            system: system.map(str::to_string),
            messages: messages.to_vec(),
            max_tokens,
        };

        let response = self.service.complete(&request).await?;
        response
            .first_text()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Transport(LlmError::unknown("Response contained no text")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::testing::mock_gateway;

    #[tokio::test]
    async fn test_returns_first_text_segment_untrimmed() {
        let (gateway, mock) = mock_gateway();
        mock.queue_text("  hello there \n");

        let text = gateway
            .complete(Some("sys"), &[LlmMessage::user("hi")], 64)
            .await
            .unwrap();
        assert_eq!(text, "  hello there \n");

        let requests = mock.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some("sys"));
        assert_eq!(requests[0].max_tokens, 64);
        assert_eq!(requests[0].messages, vec![LlmMessage::user("hi")]);
    }

    #[tokio::test]
    async fn test_rate_limit_is_distinguished() {
        let (gateway, mock) = mock_gateway();
        mock.queue_error(LlmError::rate_limit("slow down"));

        let err = gateway
            .complete(None, &[LlmMessage::user("hi")], 64)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_other_failures_are_transport_and_not_retried() {
        let (gateway, mock) = mock_gateway();
        mock.queue_error(LlmError::network("connection reset"));
        mock.queue_text("would be a retry");

        let err = gateway
            .complete(None, &[LlmMessage::user("hi")], 64)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref e) if e.kind == LlmErrorKind::Network));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_reply_is_transport_error() {
        let (gateway, mock) = mock_gateway();
        mock.queue_text("   \n  ");

        let err = gateway
            .complete(None, &[LlmMessage::user("hi")], 64)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref e) if e.kind == LlmErrorKind::Unknown));
    }

    #[test]
    fn test_empty_response_has_no_text() {
        assert!(LlmResponse::default().first_text().is_none());
    }
}
