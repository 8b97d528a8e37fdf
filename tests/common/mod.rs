//! Common test utilities for SmartTodo integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's real database, config or action log.

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// `todo()` returns a `Command` with `TODO_DATA_DIR` and `TODO_CONFIG`
/// pointing into the temp dir, so tests can run in parallel.
pub struct TestEnv {
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// A fresh environment with the database created and users alice and
    /// bob registered.
    pub fn init() -> Self {
        let env = Self::new();
        env.todo().arg("init").assert().success();
        env.todo().args(["user", "add", "alice"]).assert().success();
        env.todo().args(["user", "add", "bob"]).assert().success();
        env
    }

    /// Get a Command for the todo binary with isolated paths.
    pub fn todo(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_todo"));
        cmd.env("TODO_DATA_DIR", self.data_dir.path());
        cmd.env("TODO_CONFIG", self.config_path());
        cmd.env_remove("TODO_DB");
        cmd.env_remove("TODO_USER");
        cmd.env_remove("TODO_LOG");
        cmd
    }

    /// `todo --as <user>`.
    pub fn todo_as(&self, user: &str) -> Command {
        let mut cmd = self.todo();
        cmd.args(["--as", user]);
        cmd
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    pub fn config_path(&self) -> std::path::PathBuf {
        self.data_dir.path().join("config.kdl")
    }

    pub fn write_config(&self, kdl: &str) {
        std::fs::write(self.config_path(), kdl).unwrap();
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, user: &str, args: &[&str]) -> Value {
        let output = self.todo_as(user).args(args).assert().success();
        serde_json::from_slice(&output.get_output().stdout).unwrap()
    }

    /// Create a task as `user` and return its ID.
    pub fn create_task(&self, user: &str, title: &str) -> String {
        let outcome = self.json(user, &["task", "create", title]);
        outcome["placeholders"]["1"].as_str().unwrap().to_string()
    }

    /// Create a group as `user` and return its ID.
    pub fn create_group(&self, user: &str, name: &str) -> String {
        let outcome = self.json(user, &["group", "create", name]);
        outcome["placeholders"]["1"].as_str().unwrap().to_string()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
