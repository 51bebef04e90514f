//! Engine definitions
//!
//! An engine is data: a system template, the settings it needs, token
//! bounds, and for conversational engines the policy deciding when a
//! session becomes evaluated. Definitions ship as TOML assets.

mod catalog;

pub use catalog::{Catalog, CatalogError};

use crate::extract::BlockMarkers;
use crate::prompt::{PromptError, Settings, Template};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TURN_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_REPORT_MAX_TOKENS: u32 = 4096;

fn default_turn_max_tokens() -> u32 {
    DEFAULT_TURN_MAX_TOKENS
}

fn default_report_max_tokens() -> u32 {
    DEFAULT_REPORT_MAX_TOKENS
}

/// How a conversational engine produces its structured result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportPolicy {
    /// The model embeds a delimited block in a normal turn when it decides
    /// the session is over. First detection is final.
    Embedded(BlockMarkers),
    /// The caller asks for a report; the whole reply must be JSON. May be
    /// repeated, and chat may continue in between.
    OnDemand {
        final_instruction: String,
        #[serde(default = "default_report_max_tokens")]
        max_tokens: u32,
    },
}

impl ReportPolicy {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportPolicy::Embedded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSpec {
    #[serde(default = "default_turn_max_tokens")]
    pub turn_max_tokens: u32,
    /// Hidden user message sent at start so the model speaks first
    #[serde(default)]
    pub opening: Option<String>,
    pub report: ReportPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleShotSpec {
    #[serde(default = "default_report_max_tokens")]
    pub max_tokens: u32,
    pub prompt: Template,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMode {
    Conversation(ConversationSpec),
    SingleShot(SingleShotSpec),
}

/// On-disk shape of an engine asset
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineAsset {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    system: Template,
    #[serde(default)]
    conversation: Option<ConversationSpec>,
    #[serde(default)]
    single_shot: Option<SingleShotSpec>,
    /// Documented shape of the structured result; informational only
    #[serde(default)]
    result_shape: Option<toml::Value>,
}

/// A validated engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDef {
    pub id: String,
    pub title: String,
    pub description: String,
    pub system: Template,
    pub mode: EngineMode,
    pub result_shape: Option<serde_json::Value>,
}

impl EngineDef {
    pub fn from_toml(source: &str) -> Result<Self, EngineDefError> {
        let asset: EngineAsset = toml::from_str(source)?;
        Self::try_from(asset)
    }

    pub fn conversation(&self) -> Option<&ConversationSpec> {
        match &self.mode {
            EngineMode::Conversation(spec) => Some(spec),
            EngineMode::SingleShot(_) => None,
        }
    }

    pub fn single_shot(&self) -> Option<&SingleShotSpec> {
        match &self.mode {
            EngineMode::SingleShot(spec) => Some(spec),
            EngineMode::Conversation(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.mode {
            EngineMode::Conversation(_) => "conversation",
            EngineMode::SingleShot(_) => "single_shot",
        }
    }

    /// Every setting a caller must supply, across all templates
    pub fn required_settings(&self) -> Vec<String> {
        let mut keys = self.system.required.clone();
        if let EngineMode::SingleShot(spec) = &self.mode {
            for key in &spec.prompt.required {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Check settings against every template the engine will render
    pub fn validate_settings(&self, settings: &Settings) -> Result<(), PromptError> {
        self.system.validate(settings)?;
        if let EngineMode::SingleShot(spec) = &self.mode {
            spec.prompt.validate(settings)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineDefError {
    #[error("malformed engine asset: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("engine {id}: {reason}")]
    Invalid { id: String, reason: String },
}

impl TryFrom<EngineAsset> for EngineDef {
    type Error = EngineDefError;

    fn try_from(asset: EngineAsset) -> Result<Self, Self::Error> {
        let invalid = |reason: String| EngineDefError::Invalid {
            id: asset.id.clone(),
            reason,
        };

        if asset.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }

        asset
            .system
            .check_declarations()
            .map_err(|e| invalid(format!("system template: {e}")))?;

        let mode = match (asset.conversation, asset.single_shot) {
            (Some(spec), None) => {
                check_conversation(&spec).map_err(invalid)?;
                EngineMode::Conversation(spec)
            }
            (None, Some(spec)) => {
                spec.prompt
                    .check_declarations()
                    .map_err(|e| invalid(format!("prompt template: {e}")))?;
                if spec.prompt.text.trim().is_empty() {
                    return Err(invalid("single-shot prompt must not be empty".to_string()));
                }
                EngineMode::SingleShot(spec)
            }
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "declare either [conversation] or [single_shot], not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(invalid(
                    "missing [conversation] or [single_shot] table".to_string(),
                ))
            }
        };

        let result_shape = asset
            .result_shape
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| invalid(format!("result_shape: {e}")))?;

        Ok(EngineDef {
            id: asset.id,
            title: asset.title,
            description: asset.description,
            system: asset.system,
            mode,
            result_shape,
        })
    }
}

fn check_conversation(spec: &ConversationSpec) -> Result<(), String> {
    if spec.turn_max_tokens == 0 {
        return Err("turn_max_tokens must be positive".to_string());
    }
    if spec.opening.as_deref().is_some_and(|o| o.trim().is_empty()) {
        return Err("opening must not be blank".to_string());
    }
    match &spec.report {
        ReportPolicy::Embedded(markers) => {
            if markers.open.is_empty() || markers.close.is_empty() {
                return Err("block markers must not be empty".to_string());
            }
            if markers.open == markers.close {
                return Err("opening and closing markers must differ".to_string());
            }
        }
        ReportPolicy::OnDemand {
            final_instruction,
            max_tokens,
        } => {
            if final_instruction.trim().is_empty() {
                return Err("final_instruction must not be empty".to_string());
            }
            if *max_tokens == 0 {
                return Err("report max_tokens must be positive".to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBEDDED: &str = r#"
id = "demo"
title = "Demo"

[system]
required = ["topic"]
text = "Discuss {{topic}}."

[conversation]
opening = "Start please."

[conversation.report]
mode = "embedded"
open = "<<"
close = ">>"
"#;

    #[test]
    fn test_parse_embedded_conversation() {
        let def = EngineDef::from_toml(EMBEDDED).unwrap();
        let spec = def.conversation().unwrap();

        assert_eq!(def.kind_name(), "conversation");
        assert_eq!(spec.turn_max_tokens, DEFAULT_TURN_MAX_TOKENS);
        assert_eq!(spec.opening.as_deref(), Some("Start please."));
        assert_eq!(spec.report, ReportPolicy::Embedded(BlockMarkers::new("<<", ">>")));
        assert!(spec.report.is_terminal());
    }

    #[test]
    fn test_parse_on_demand_defaults() {
        let def = EngineDef::from_toml(
            r#"
id = "chat"
title = "Chat"
[system]
text = "Be kind."
[conversation.report]
mode = "on_demand"
final_instruction = "Summarize as JSON."
"#,
        )
        .unwrap();

        match &def.conversation().unwrap().report {
            ReportPolicy::OnDemand { max_tokens, .. } => {
                assert_eq!(*max_tokens, DEFAULT_REPORT_MAX_TOKENS);
            }
            ReportPolicy::Embedded(_) => panic!("expected on-demand policy"),
        }
    }

    #[test]
    fn test_single_shot_required_settings_are_merged() {
        let def = EngineDef::from_toml(
            r#"
id = "plan"
title = "Plan"
[system]
required = ["goal"]
text = "Plan for {{goal}}."
[single_shot.prompt]
required = ["goal", "weeks"]
text = "Goal {{goal}} over {{weeks}} weeks."
"#,
        )
        .unwrap();

        assert!(def.conversation().is_none());
        assert_eq!(def.required_settings(), vec!["goal", "weeks"]);

        let mut settings = Settings::new();
        settings.insert("goal".to_string(), "learn rust".to_string());
        assert_eq!(
            def.validate_settings(&settings).unwrap_err(),
            PromptError::MissingKey {
                key: "weeks".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_both_modes() {
        let source = format!(
            "{EMBEDDED}\n[single_shot.prompt]\ntext = \"x\"\n"
        );
        assert!(matches!(
            EngineDef::from_toml(&source),
            Err(EngineDefError::Invalid { .. })
        ));
    }

    #[test]
    fn test_rejects_undeclared_placeholder() {
        let source = EMBEDDED.replace("Discuss {{topic}}.", "Discuss {{subject}}.");
        let err = EngineDef::from_toml(&source).unwrap_err();
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn test_rejects_identical_markers() {
        let source = EMBEDDED.replace("close = \">>\"", "close = \"<<\"");
        assert!(EngineDef::from_toml(&source).is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let source = format!("stray = 1\n{EMBEDDED}");
        assert!(matches!(
            EngineDef::from_toml(&source),
            Err(EngineDefError::Parse(_))
        ));
    }
}
