//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The [`TodoConfig`] struct mirroring the file
//! - Parsing from and serialization to KDL
//! - Validation of every value

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Urgency;
use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log levels accepted by `log-level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Largest accepted `max-intents`.
pub const MAX_INTENTS_LIMIT: i128 = 1000;

/// Settings stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// database "/home/me/.local/share/smarttodo/todo.db"
/// log-level "info"
/// output-format "human"  // or "json"
/// default-urgency "normal"
/// max-intents 20
/// action-log #true
/// action-log-path "~/todo-actions.log"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoConfig {
    /// Path of the SQLite database
    pub database: Option<PathBuf>,

    /// Fallback tracing filter when `TODO_LOG` is unset
    pub log_level: Option<String>,

    pub output_format: Option<OutputFormat>,

    /// Urgency for new tasks that do not name one
    pub default_urgency: Option<Urgency>,

    /// Maximum intents in one batch
    pub max_intents: Option<usize>,

    /// Whether to append to the action log
    pub action_log: Option<bool>,

    pub action_log_path: Option<PathBuf>,
}

fn first_value<'a>(doc: &'a KdlDocument, key: &str) -> Option<&'a KdlValue> {
    doc.get(key)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_value(doc: &KdlDocument, key: &str) -> Result<Option<String>> {
    match first_value(doc, key) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| Error::Config(format!("{key} must be a string"))),
    }
}

fn bool_value(doc: &KdlDocument, key: &str) -> Result<Option<bool>> {
    match first_value(doc, key) {
        None => Ok(None),
        Some(value) => {
            if let Some(b) = value.as_bool() {
                return Ok(Some(b));
            }
            match value.as_string() {
                Some("true") => Ok(Some(true)),
                Some("false") => Ok(Some(false)),
                _ => Err(Error::Config(format!("{key} must be #true or #false"))),
            }
        }
    }
}

impl TodoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a KDL document, rejecting invalid values.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();

        config.database = string_value(doc, "database")?.map(PathBuf::from);

        if let Some(level) = string_value(doc, "log-level")? {
            let level = level.to_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(Error::Config(format!(
                    "log-level must be one of {}, got '{level}'",
                    LOG_LEVELS.join(", ")
                )));
            }
            config.log_level = Some(level);
        }

        if let Some(format) = string_value(doc, "output-format")? {
            config.output_format = Some(OutputFormat::parse(&format).ok_or_else(|| {
                Error::Config(format!("output-format must be json or human, got '{format}'"))
            })?);
        }

        if let Some(urgency) = string_value(doc, "default-urgency")? {
            config.default_urgency = Some(
                Urgency::parse(&urgency).map_err(|e| Error::Config(format!("default-urgency: {e}")))?,
            );
        }

        if let Some(value) = first_value(doc, "max-intents") {
            let n = value
                .as_integer()
                .ok_or_else(|| Error::Config("max-intents must be an integer".to_string()))?;
            if !(1..=MAX_INTENTS_LIMIT).contains(&n) {
                return Err(Error::Config(format!(
                    "max-intents must be 1-{MAX_INTENTS_LIMIT}, got {n}"
                )));
            }
            config.max_intents = Some(n as usize);
        }

        config.action_log = bool_value(doc, "action-log")?;
        config.action_log_path = string_value(doc, "action-log-path")?.map(PathBuf::from);

        Ok(config)
    }

    /// Parse config from KDL text.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e| Error::Config(format!("invalid KDL: {e}")))?;
        Self::from_kdl(&doc)
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        let mut push = |name: &str, value: KdlValue| {
            let mut node = KdlNode::new(name);
            node.push(KdlEntry::new(value));
            doc.nodes_mut().push(node);
        };

        if let Some(ref database) = self.database {
            push("database", KdlValue::String(database.display().to_string()));
        }
        if let Some(ref level) = self.log_level {
            push("log-level", KdlValue::String(level.clone()));
        }
        if let Some(format) = self.output_format {
            push("output-format", KdlValue::String(format.as_str().to_string()));
        }
        if let Some(urgency) = self.default_urgency {
            push("default-urgency", KdlValue::String(urgency.as_str().to_string()));
        }
        if let Some(n) = self.max_intents {
            push("max-intents", KdlValue::Integer(n as i128));
        }
        if let Some(enabled) = self.action_log {
            push("action-log", KdlValue::Bool(enabled));
        }
        if let Some(ref path) = self.action_log_path {
            push("action-log-path", KdlValue::String(path.display().to_string()));
        }

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("human"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_config_from_kdl_empty() {
        let config = TodoConfig::from_kdl(&KdlDocument::new()).unwrap();
        assert_eq!(config, TodoConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let config = TodoConfig::parse(
            r#"
            database "/tmp/todo.db"
            log-level "INFO"
            output-format "human"
            default-urgency "high"
            max-intents 5
            action-log #false
            action-log-path "/tmp/actions.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.database, Some(PathBuf::from("/tmp/todo.db")));
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.output_format, Some(OutputFormat::Human));
        assert_eq!(config.default_urgency, Some(Urgency::High));
        assert_eq!(config.max_intents, Some(5));
        assert_eq!(config.action_log, Some(false));
        assert_eq!(config.action_log_path, Some(PathBuf::from("/tmp/actions.log")));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        for text in [
            r#"log-level "loud""#,
            r#"output-format "yaml""#,
            r#"default-urgency "asap""#,
            "max-intents 0",
            r#"max-intents "ten""#,
            "action-log 1",
        ] {
            let err = TodoConfig::parse(text).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{text} gave {err:?}");
        }
    }

    #[test]
    fn test_config_rejects_malformed_kdl() {
        assert!(matches!(
            TodoConfig::parse("database \"unterminated"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = TodoConfig {
            database: Some(PathBuf::from("/srv/todo.db")),
            log_level: Some("debug".to_string()),
            output_format: Some(OutputFormat::Json),
            default_urgency: Some(Urgency::Low),
            max_intents: Some(50),
            action_log: Some(true),
            action_log_path: None,
        };
        let parsed = TodoConfig::from_kdl(&config.to_kdl()).unwrap();
        assert_eq!(config, parsed);
    }
}
