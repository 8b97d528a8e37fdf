//! Configuration for SmartTodo.
//!
//! ## config.kdl - User preferences
//!
//! Located at `~/.config/smarttodo/config.kdl` (platform config dir), or the
//! path in `TODO_CONFIG`.
//!
//! Contains:
//! - `database` - SQLite database path
//! - `log-level` - diagnostic log level when `TODO_LOG` is unset
//! - `output-format` - "json" or "human"
//! - `default-urgency` - urgency for new tasks
//! - `max-intents` - largest batch a session accepts
//! - `action-log` / `action-log-path` - audit log switch and location
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_ENV, ConfigOverrides, DATA_DIR_ENV, DB_ENV, LOG_ENV, Resolved, ResolvedConfig, USER_ENV, ValueSource,
    config_file_path, load_config_file, resolve_config, resolve_config_with_env,
};
pub use schema::{OutputFormat, TodoConfig};
