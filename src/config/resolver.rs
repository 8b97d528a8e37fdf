//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`TODO_DB`, `TODO_USER`)
//! 3. config.kdl
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use crate::Result;
use crate::config::{OutputFormat, TodoConfig};
use crate::models::Urgency;
use crate::session::DEFAULT_MAX_INTENTS;

/// Environment variable overriding the database path.
pub const DB_ENV: &str = "TODO_DB";

/// Environment variable naming the acting user.
pub const USER_ENV: &str = "TODO_USER";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TODO_CONFIG";

/// Environment variable holding a tracing filter.
pub const LOG_ENV: &str = "TODO_LOG";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TODO_DATA_DIR";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<PathBuf>,
    pub user: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database: Resolved<PathBuf>,
    /// Acting user name; commands that act on data require it
    pub user: Option<Resolved<String>>,
    pub output_format: Resolved<OutputFormat>,
    pub log_level: Resolved<String>,
    pub default_urgency: Resolved<Urgency>,
    pub max_intents: Resolved<usize>,
    pub action_log: Resolved<bool>,
    pub action_log_path: Resolved<PathBuf>,
}

impl ResolvedConfig {
    pub fn database(&self) -> &Path {
        &self.database.value
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_ref().map(|r| r.value.as_str())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// Directory holding SmartTodo data files.
///
/// `TODO_DATA_DIR` wins over the platform data dir, which keeps tests away
/// from the user's real database.
fn data_dir<F: Fn(&str) -> Option<String>>(env: F) -> PathBuf {
    match env(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("smarttodo"),
    }
}

/// Location of config.kdl: `TODO_CONFIG`, else the platform config dir.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|dir| dir.join("smarttodo").join("config.kdl"))
}

/// Read config.kdl, treating a missing file as empty.
pub fn load_config_file(path: &Path) -> Result<TodoConfig> {
    if !path.exists() {
        return Ok(TodoConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    TodoConfig::parse(&text).map_err(|e| match e {
        crate::Error::Config(msg) => crate::Error::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Resolve configuration from the process environment.
pub fn resolve_config(file: &TodoConfig, overrides: &ConfigOverrides) -> ResolvedConfig {
    resolve_config_with_env(file, overrides, |key| std::env::var(key).ok())
}

/// Resolve configuration with an explicit environment lookup.
pub fn resolve_config_with_env<F>(
    file: &TodoConfig,
    overrides: &ConfigOverrides,
    env: F,
) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |key: &str| env(key).filter(|v| !v.is_empty());
    let data = data_dir(&env);

    // Resolve database
    let database = if let Some(ref path) = overrides.database {
        Resolved::new(expand_home(path), ValueSource::CliFlag)
    } else if let Some(path) = env_value(DB_ENV) {
        Resolved::new(expand_home(Path::new(&path)), ValueSource::EnvVar(DB_ENV.to_string()))
    } else if let Some(ref path) = file.database {
        Resolved::new(expand_home(path), ValueSource::ConfigFile)
    } else {
        Resolved::new(data.join("todo.db"), ValueSource::Default)
    };

    // Resolve user (no default)
    let user = if let Some(ref user) = overrides.user {
        Some(Resolved::new(user.clone(), ValueSource::CliFlag))
    } else {
        env_value(USER_ENV).map(|user| Resolved::new(user, ValueSource::EnvVar(USER_ENV.to_string())))
    };

    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = file.output_format {
        Resolved::new(format, ValueSource::ConfigFile)
    } else {
        Resolved::new(OutputFormat::Json, ValueSource::Default)
    };

    let log_level = match file.log_level {
        Some(ref level) => Resolved::new(level.clone(), ValueSource::ConfigFile),
        None => Resolved::new("warn".to_string(), ValueSource::Default),
    };

    let default_urgency = match file.default_urgency {
        Some(urgency) => Resolved::new(urgency, ValueSource::ConfigFile),
        None => Resolved::new(Urgency::default(), ValueSource::Default),
    };

    let max_intents = match file.max_intents {
        Some(n) => Resolved::new(n, ValueSource::ConfigFile),
        None => Resolved::new(DEFAULT_MAX_INTENTS, ValueSource::Default),
    };

    let action_log = match file.action_log {
        Some(enabled) => Resolved::new(enabled, ValueSource::ConfigFile),
        None => Resolved::new(true, ValueSource::Default),
    };

    let action_log_path = match file.action_log_path {
        Some(ref path) => Resolved::new(expand_home(path), ValueSource::ConfigFile),
        None => Resolved::new(data.join("action.log"), ValueSource::Default),
    };

    ResolvedConfig {
        database,
        user,
        output_format,
        log_level,
        default_urgency,
        max_intents,
        action_log,
        action_log_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::EnvVar("FOO".to_string())), "env:FOO");
        assert_eq!(format!("{}", ValueSource::ConfigFile), "config");
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    fn test_resolve_defaults() {
        let config = resolve_config_with_env(&TodoConfig::default(), &ConfigOverrides::new(), env_of(&[]));

        assert_eq!(config.database.source, ValueSource::Default);
        assert!(config.database().ends_with("smarttodo/todo.db"));
        assert!(config.user.is_none());
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.log_level.value, "warn");
        assert_eq!(config.max_intents.value, DEFAULT_MAX_INTENTS);
        assert!(config.action_log.value);
    }

    #[test]
    fn test_cli_beats_env_beats_file() {
        let file = TodoConfig {
            database: Some(PathBuf::from("/file/todo.db")),
            ..TodoConfig::default()
        };
        let env = [(DB_ENV, "/env/todo.db"), (USER_ENV, "env-user")];

        let from_file = resolve_config_with_env(&file, &ConfigOverrides::new(), env_of(&[]));
        assert_eq!(from_file.database.value, PathBuf::from("/file/todo.db"));
        assert_eq!(from_file.database.source, ValueSource::ConfigFile);

        let from_env = resolve_config_with_env(&file, &ConfigOverrides::new(), env_of(&env));
        assert_eq!(from_env.database.value, PathBuf::from("/env/todo.db"));
        assert_eq!(from_env.database.source, ValueSource::EnvVar(DB_ENV.to_string()));
        assert_eq!(from_env.user(), Some("env-user"));

        let overrides = ConfigOverrides::new()
            .with_database("/cli/todo.db")
            .with_user("cli-user");
        let from_cli = resolve_config_with_env(&file, &overrides, env_of(&env));
        assert_eq!(from_cli.database.value, PathBuf::from("/cli/todo.db"));
        assert_eq!(from_cli.database.source, ValueSource::CliFlag);
        assert_eq!(from_cli.user(), Some("cli-user"));
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let config = resolve_config_with_env(
            &TodoConfig::default(),
            &ConfigOverrides::new(),
            env_of(&[(USER_ENV, "")]),
        );
        assert!(config.user.is_none());
    }

    #[test]
    fn test_file_settings_flow_through() {
        let file = TodoConfig {
            output_format: Some(OutputFormat::Human),
            default_urgency: Some(Urgency::Critical),
            max_intents: Some(3),
            action_log: Some(false),
            ..TodoConfig::default()
        };
        let config = resolve_config_with_env(&file, &ConfigOverrides::new(), env_of(&[]));
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.default_urgency.value, Urgency::Critical);
        assert_eq!(config.max_intents.value, 3);
        assert!(!config.action_log.value);

        let config = resolve_config_with_env(
            &file,
            &ConfigOverrides::new().with_output_format(OutputFormat::Json),
            env_of(&[]),
        );
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.output_format.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_data_dir_env_moves_defaults() {
        let config = resolve_config_with_env(
            &TodoConfig::default(),
            &ConfigOverrides::new(),
            env_of(&[(DATA_DIR_ENV, "/data")]),
        );
        assert_eq!(config.database.value, PathBuf::from("/data/todo.db"));
        assert_eq!(config.database.source, ValueSource::Default);
        assert_eq!(config.action_log_path.value, PathBuf::from("/data/action.log"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = load_config_file(&temp.path().join("config.kdl")).unwrap();
        assert_eq!(config, TodoConfig::default());
    }

    #[test]
    fn test_load_invalid_file_names_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.kdl");
        std::fs::write(&path, "max-intents -4\n").unwrap();
        match load_config_file(&path) {
            Err(crate::Error::Config(msg)) => assert!(msg.contains("config.kdl")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_process_env_is_read() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("custom.kdl");

        // SAFETY: env-mutating tests are serialized
        unsafe {
            std::env::set_var(CONFIG_ENV, &config_path);
            std::env::set_var(USER_ENV, "process-user");
        }
        let found = config_file_path();
        let config = resolve_config(&TodoConfig::default(), &ConfigOverrides::new());
        unsafe {
            std::env::remove_var(CONFIG_ENV);
            std::env::remove_var(USER_ENV);
        }

        assert_eq!(found, Some(config_path));
        assert_eq!(config.user(), Some("process-user"));
        assert_eq!(config.user.unwrap().source, ValueSource::EnvVar(USER_ENV.to_string()));
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/abs/path");
        assert_eq!(expand_home(plain), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/x.log")), home.join("x.log"));
        }
    }
}
