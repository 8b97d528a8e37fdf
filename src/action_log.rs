//! Audit log of CLI invocations.
//!
//! Every `todo` command appends one JSON line to the action log, whether it
//! succeeded or not. Writing the log never fails the command: problems are
//! reported through `tracing` and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::ResolvedConfig;

/// Strings longer than this are truncated in logged arguments.
const MAX_LOGGED_STRING: usize = 100;

/// Arrays longer than this are replaced by a count.
const MAX_LOGGED_ARRAY: usize = 10;

/// One action log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub timestamp: DateTime<Utc>,

    /// Database the command ran against
    pub database: String,

    /// Command name (e.g., "task create", "batch")
    pub command: String,

    /// Sanitized command arguments
    pub args: serde_json::Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// Acting user as given on the command line, or "anonymous"
    pub user: String,
}

/// Appends [`ActionEntry`] records to a JSONL file.
#[derive(Debug, Clone)]
pub struct ActionLogger {
    /// `None` when logging is disabled
    path: Option<PathBuf>,
    database: PathBuf,
    user: Option<String>,
}

impl ActionLogger {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            path: config
                .action_log
                .value
                .then(|| config.action_log_path.value.clone()),
            database: config.database.value.clone(),
            user: config.user().map(str::to_string),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Record one command. Never fails.
    pub fn record(
        &self,
        command: &str,
        args: &serde_json::Value,
        result: std::result::Result<(), String>,
        duration_ms: u64,
    ) {
        let Some(path) = self.path.as_deref() else {
            return;
        };

        let (success, error) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        };
        let entry = ActionEntry {
            timestamp: Utc::now(),
            database: self.database.display().to_string(),
            command: command.to_string(),
            args: sanitize_args(args),
            success,
            error,
            duration_ms,
            user: self.user.clone().unwrap_or_else(|| "anonymous".to_string()),
        };

        if let Err(e) = append(path, &entry) {
            tracing::warn!(path = %path.display(), "failed to write action log: {e}");
        }
    }
}

fn append(path: &Path, entry: &ActionEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "credential", "token", "secret", "hash"]
        .iter()
        .any(|word| key.contains(word))
}

/// Redact secrets, shorten paths to their file name, and cap sizes.
pub fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if is_sensitive(key) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        sanitize_args(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) if items.len() > MAX_LOGGED_ARRAY => {
            Value::String(format!("[{} items]", items.len()))
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_args).collect()),
        Value::String(s) => {
            let s = s.rsplit(['/', '\\']).next().unwrap_or(s);
            let chars = s.chars().count();
            if chars > MAX_LOGGED_STRING {
                let head: String = s.chars().take(MAX_LOGGED_STRING - 3).collect();
                Value::String(format!("{head}... ({chars} chars)"))
            } else {
                Value::String(s.to_string())
            }
        }
        _ => args.clone(),
    }
}
