//! Data models for SmartTodo entities.
//!
//! This module defines the core data structures:
//! - `User` - An authenticated identity that owns tasks and joins groups
//! - `Group` - A named bloc of users, nested through an optional parent
//! - `Task` - A work item with status, urgency, recurrence, assignees and prerequisites
//! - `TaskDraft` - The attributes of a task that does not exist yet

pub mod graph;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{Error, Result};

/// Task status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" | "in-progress" | "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            _ => Err(Error::InvalidInput(format!(
                "invalid status '{s}': must be todo, in_progress, or completed"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency level, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Urgency {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(Error::InvalidInput(format!(
                "invalid urgency '{s}': must be low, normal, high, or critical"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task repeats once completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(Error::InvalidInput(format!(
                "invalid recurrence '{s}': must be none, daily, weekly, monthly, or yearly"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity.
///
/// Credentials are verified outside this crate; only the hash handed over
/// by the credential layer is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (e.g., "us-1a2b3c4d")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(skip_serializing)]
    pub credential_hash: String,

    pub created_at: DateTime<Utc>,
}

/// A named bloc of users that can be assigned to tasks.
///
/// Members of a group are also members of every ancestor reached through
/// `parent`, so the parent links must never form a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier (e.g., "gp-1a2b3c4d")
    pub id: String,

    /// Unique group name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Enclosing group, if nested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// User who created the group and may modify it
    pub created_by: String,

    /// Incremented on every persisted change; used for optimistic commit checks
    #[serde(default)]
    pub revision: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Create a new top-level group.
    pub fn new(id: String, name: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description: None,
            parent: None,
            created_by,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (e.g., "tk-1a2b3c4d")
    pub id: String,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub urgency: Urgency,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub recurrence: Recurrence,

    /// Creator and owner
    pub owner: String,

    /// Users assigned directly
    #[serde(default)]
    pub assignee_users: Vec<String>,

    /// Groups assigned as a bloc
    #[serde(default)]
    pub assignee_groups: Vec<String>,

    /// Task IDs this task depends on, in declaration order
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Incremented on every persisted change; used for optimistic commit checks
    #[serde(default)]
    pub revision: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task with the given ID, title and owner.
    pub fn new(id: String, title: String, owner: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: None,
            status: TaskStatus::default(),
            urgency: Urgency::default(),
            due_date: None,
            recurrence: Recurrence::default(),
            owner,
            assignee_users: Vec::new(),
            assignee_groups: Vec::new(),
            prerequisites: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Materialize a draft under the given ID.
    pub fn from_draft(id: String, draft: TaskDraft) -> Self {
        let mut task = Self::new(id, draft.title, draft.owner);
        task.description = draft.description;
        task.urgency = draft.urgency;
        task.due_date = draft.due_date;
        task.recurrence = draft.recurrence;
        task.assignee_users = draft.assignee_users;
        task.assignee_groups = draft.assignee_groups;
        task.prerequisites = draft.prerequisites;
        task
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Attributes of a task that has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub urgency: Urgency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub recurrence: Recurrence,
    pub owner: String,
    pub assignee_users: Vec<String>,
    pub assignee_groups: Vec<String>,
    pub prerequisites: Vec<String>,
}

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Validate a task title: non-empty after trimming and at most [`MAX_TITLE_LEN`] characters.
pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::InvalidInput(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::InvalidInput(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// Generate an ID for an entity.
///
/// Format: `<prefix>-<8 hex chars>`
/// - Task prefix: "tk"
/// - Group prefix: "gp"
/// - User prefix: "us"
///
/// The ID is a pure function of the seed; callers supply a seed that is
/// unique per entity (a session ID plus a placeholder number, for example).
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b":");
    hasher.update(seed.as_bytes());
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    format!("{}-{}", prefix, &hash_hex[..8])
}

/// Validate that an ID matches the expected format.
pub fn validate_id(id: &str, prefix: &str) -> Result<()> {
    let Some(suffix) = id.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) else {
        return Err(Error::InvalidInput(format!(
            "ID must start with '{}-', got: {}",
            prefix, id
        )));
    };

    if suffix.len() != 8 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "ID suffix must be 8 hex characters, got: {}",
            suffix
        )));
    }

    Ok(())
}
