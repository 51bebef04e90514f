//! Single-shot engines: one prompt in, one JSON object out

use crate::engine::EngineDef;
use crate::extract::{self, StructuredResult};
use crate::gateway::CompletionGateway;
use crate::prompt::{self, Message, Settings};
use crate::session::SessionError;

/// Render the engine's prompt from `fields`, make one call, and parse the
/// whole reply as JSON. Missing fields fail before any call is made.
pub async fn run_single_shot(
    gateway: &CompletionGateway,
    engine: &EngineDef,
    fields: &Settings,
) -> Result<StructuredResult, SessionError> {
    let Some(spec) = engine.single_shot() else {
        return Err(SessionError::WrongEngineKind {
            engine: engine.id.clone(),
            expected: "single_shot",
        });
    };

    engine.validate_settings(fields)?;
    let system = prompt::render_system(&engine.system, fields)?;
    let user_prompt = spec.prompt.render(fields)?;
    let composed = prompt::compose(&system, &[Message::user(user_prompt)], None)?;

    let raw = gateway
        .complete(Some(&composed.system), &composed.messages, spec.max_tokens)
        .await?;

    extract::parse_payload(&raw).map_err(|e| {
        tracing::warn!(engine = %engine.id, error = %e, "Single-shot reply was not JSON");
        SessionError::MalformedReply {
            reason: e.to_string(),
            raw,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Catalog;
    use crate::llm::LlmError;
    use crate::prompt::PromptError;
    use crate::testing::mock_gateway;
    use serde_json::{json, Value};

    fn fields(pairs: &[(&str, &str)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let (gateway, mock) = mock_gateway();
        mock.queue_text("```json\n{\"topic\": \"Ownership\", \"questions\": []}\n```");
        let engine = Catalog::builtin().unwrap().get("quiz_generator").unwrap();

        let result = run_single_shot(&gateway, &engine, &fields(&[("topic", "Ownership")]))
            .await
            .unwrap();

        assert_eq!(
            Value::Object(result),
            json!({"topic": "Ownership", "questions": []})
        );

        let request = &mock.recorded_requests()[0];
        assert_eq!(request.max_tokens, 4096);
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0]
            .content
            .contains("medium multiple-choice quiz of 5 questions on Ownership"));
    }

    #[tokio::test]
    async fn test_missing_field_makes_no_call() {
        let (gateway, mock) = mock_gateway();
        let engine = Catalog::builtin().unwrap().get("resume_review").unwrap();

        let err = run_single_shot(&gateway, &engine, &fields(&[("resume", "...")]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Configuration(PromptError::MissingKey { ref key }) if key == "target_role"
        ));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let (gateway, mock) = mock_gateway();
        mock.queue_text("Here is your plan: week 1, read a book.");
        let engine = Catalog::builtin().unwrap().get("study_plan").unwrap();

        let err = run_single_shot(
            &gateway,
            &engine,
            &fields(&[("goal", "Learn Rust"), ("weeks", "4")]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::MalformedReply { .. }));
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let (gateway, mock) = mock_gateway();
        mock.queue_error(LlmError::rate_limit("busy"));
        let engine = Catalog::builtin().unwrap().get("career_roadmap").unwrap();

        let err = run_single_shot(
            &gateway,
            &engine,
            &fields(&[("current_role", "QA"), ("target_role", "SRE")]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_conversation_engine_rejected() {
        let (gateway, _mock) = mock_gateway();
        let engine = Catalog::builtin().unwrap().get("mock_interviewer").unwrap();

        let err = run_single_shot(&gateway, &engine, &Settings::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::WrongEngineKind { .. }));
    }
}
