//! `{{key}}` templates with declared inputs

use super::PromptError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Settings fixed at session start, e.g. `role = "Backend Engineer"`
pub type Settings = BTreeMap<String, String>;

/// A prompt template plus the inputs it declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub text: String,
    /// Keys the caller must supply
    #[serde(default)]
    pub required: Vec<String>,
    /// Keys the caller may supply, with fallbacks
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl Template {
    #[cfg(test)]
    pub fn new(text: impl Into<String>, required: &[&str]) -> Self {
        Self {
            text: text.into(),
            required: required.iter().map(|k| (*k).to_string()).collect(),
            defaults: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        PLACEHOLDER
            .captures_iter(&self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Check that every placeholder is declared as required or defaulted.
    ///
    /// Run once when an engine definition is loaded so a typo in an asset
    /// shows up at startup instead of on the first user request.
    pub fn check_declarations(&self) -> Result<(), PromptError> {
        for name in self.placeholders() {
            if !self.required.iter().any(|r| r == name) && !self.defaults.contains_key(name) {
                return Err(PromptError::UndeclaredPlaceholder {
                    key: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check the settings against the declared required keys.
    ///
    /// A key whose value is blank counts as missing.
    pub fn validate(&self, settings: &Settings) -> Result<(), PromptError> {
        for key in &self.required {
            if lookup(settings, key).is_none() && !self.defaults.contains_key(key) {
                return Err(PromptError::MissingKey { key: key.clone() });
            }
        }
        Ok(())
    }

    pub fn render(&self, settings: &Settings) -> Result<String, PromptError> {
        self.validate(settings)?;
        for key in self.placeholders() {
            self.resolve(settings, key)?;
        }

        let rendered = PLACEHOLDER.replace_all(&self.text, |caps: &Captures<'_>| {
            caps.get(1)
                .and_then(|m| self.resolve(settings, m.as_str()).ok())
                .unwrap_or_default()
                .to_string()
        });
        Ok(rendered.into_owned())
    }

    fn resolve<'a>(&'a self, settings: &'a Settings, key: &str) -> Result<&'a str, PromptError> {
        lookup(settings, key)
            .or_else(|| self.defaults.get(key).map(String::as_str))
            .ok_or_else(|| PromptError::MissingKey {
                key: key.to_string(),
            })
    }
}

fn lookup<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|v| v.as_str().trim())
        .filter(|v| !v.is_empty())
}
