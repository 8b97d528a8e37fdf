//! SmartTodo - a shared task list driven by staged multi-step commands.
//!
//! This library provides the core of the `todo` CLI: the scope resolver that
//! decides who may touch which task, the dependency validator that keeps the
//! prerequisite graph acyclic, the recurrence calculator, and the staged
//! command state machine that applies a whole batch of intents atomically.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deps;
pub mod models;
pub mod recurrence;
pub mod scope;
pub mod session;
pub mod storage;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use tempfile::TempDir;

    use crate::models::{Group, Task, User};
    use crate::storage::SqliteStore;

    /// Test environment with an isolated on-disk database.
    ///
    /// Use [`TestEnv::open_store`] more than once to get independent
    /// connections to the same file (concurrent committers).
    pub struct TestEnv {
        pub data_dir: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                data_dir: TempDir::new().unwrap(),
            }
        }

        pub fn db_path(&self) -> std::path::PathBuf {
            self.data_dir.path().join("todo.db")
        }

        pub fn open_store(&self) -> SqliteStore {
            SqliteStore::open(&self.db_path()).unwrap()
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Seed a user directly into the store.
    pub fn seed_user(store: &mut SqliteStore, name: &str) -> User {
        store.create_user(name, "x").unwrap()
    }

    /// Seed a group directly into the store.
    pub fn seed_group(
        store: &mut SqliteStore,
        name: &str,
        parent: Option<&str>,
        created_by: &str,
    ) -> Group {
        let mut group = Group::new(
            crate::models::generate_id("gp", name),
            name.to_string(),
            created_by.to_string(),
        );
        group.parent = parent.map(str::to_string);
        store.insert_group(&group).unwrap();
        group
    }

    /// Seed a task directly into the store.
    pub fn seed_task(store: &mut SqliteStore, title: &str, owner: &str) -> Task {
        let task = Task::new(
            crate::models::generate_id("tk", title),
            title.to_string(),
            owner.to_string(),
        );
        store.insert_task(&task).unwrap();
        task
    }
}

/// Library-level error type for SmartTodo operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run `todo init` first")]
    NotInitialized,

    #[error("Cycle detected: {0}")]
    Cycle(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Dependency not met: task {task} requires {prerequisite} to be completed first")]
    DependencyNotMet { task: String, prerequisite: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session already completed")]
    SessionClosed,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Database(_) => "database",
            Error::Config(_) => "config",
            Error::NotInitialized => "not_initialized",
            Error::Cycle(_) => "cycle",
            Error::Unauthorized(_) => "unauthorized",
            Error::DependencyNotMet { .. } => "dependency_not_met",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::InvalidInput(_) => "invalid_input",
            Error::SessionClosed => "session_closed",
            Error::Other(_) => "other",
        }
    }
}

/// Result type alias for SmartTodo operations.
pub type Result<T> = std::result::Result<T, Error>;
