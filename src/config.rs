//! Runtime configuration from the environment

use crate::gateway::DEFAULT_MODEL;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Completion provider credential; engines are unavailable without it
    pub api_key: Option<String>,
    /// Base URL replacing the provider's public endpoint
    pub gateway: Option<String>,
    pub model: String,
    pub port: u16,
    /// Directory of engine definitions overriding the built-in ones
    pub prompts_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            port: DEFAULT_PORT,
            prompts_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_key: non_empty("ANTHROPIC_API_KEY"),
            gateway: non_empty("LLM_GATEWAY"),
            model: non_empty("SAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            port: non_empty("SAGE_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            prompts_dir: non_empty("SAGE_PROMPTS_DIR").map(PathBuf::from),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}
