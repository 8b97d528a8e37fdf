//! Command intents and the references they use.
//!
//! Intents arrive as JSON objects tagged by `op`, for example:
//!
//! ```json
//! {"op": "create_task", "title": "Write report", "urgency": "high"}
//! {"op": "set_dependency", "task": "pending:2", "prerequisite": "pending:1"}
//! {"op": "complete_task", "task": "current"}
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::models::{Recurrence, TaskStatus, Urgency};

/// A reference to a task: persisted, created earlier in the batch, or the
/// session's current task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskRef {
    Existing(String),
    Pending(u32),
    Current,
}

/// A reference to a group: persisted or created earlier in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GroupRef {
    Existing(String),
    Pending(u32),
}

fn parse_pending(n: &str, raw: &str) -> Result<u32, Error> {
    match n.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidInput(format!(
            "invalid placeholder '{raw}': expected pending:<n> with n >= 1"
        ))),
    }
}

fn parse_existing(id: &str, raw: &str) -> Result<String, Error> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::InvalidInput(format!("empty identifier in '{raw}'")));
    }
    Ok(id.to_string())
}

impl FromStr for TaskRef {
    type Err = Error;

    /// Accepts `existing:<id>`, `pending:<n>`, `current`, or a bare ID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "current" {
            return Ok(Self::Current);
        }
        if let Some(n) = s.strip_prefix("pending:") {
            return parse_pending(n, s).map(Self::Pending);
        }
        let id = s.strip_prefix("existing:").unwrap_or(s);
        parse_existing(id, s).map(Self::Existing)
    }
}

impl FromStr for GroupRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(n) = s.strip_prefix("pending:") {
            return parse_pending(n, s).map(Self::Pending);
        }
        let id = s.strip_prefix("existing:").unwrap_or(s);
        parse_existing(id, s).map(Self::Existing)
    }
}

impl TryFrom<String> for TaskRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for GroupRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing(id) => write!(f, "existing:{id}"),
            Self::Pending(n) => write!(f, "pending:{n}"),
            Self::Current => f.write_str("current"),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing(id) => write!(f, "existing:{id}"),
            Self::Pending(n) => write!(f, "pending:{n}"),
        }
    }
}

impl From<TaskRef> for String {
    fn from(r: TaskRef) -> Self {
        r.to_string()
    }
}

impl From<GroupRef> for String {
    fn from(r: GroupRef) -> Self {
        r.to_string()
    }
}

/// One primitive command in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Intent {
    CreateTask {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        urgency: Option<Urgency>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recurrence: Option<Recurrence>,
        /// User IDs
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        assignee_users: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        assignee_groups: Vec<GroupRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        depends_on: Vec<TaskRef>,
    },
    UpdateTask {
        task: TaskRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        urgency: Option<Urgency>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recurrence: Option<Recurrence>,
        /// `completed` goes through the same checks as `complete_task`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<TaskStatus>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        add_assignee_users: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        remove_assignee_users: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        add_assignee_groups: Vec<GroupRef>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        remove_assignee_groups: Vec<GroupRef>,
    },
    SetDependency {
        task: TaskRef,
        prerequisite: TaskRef,
    },
    /// Drop the edge `task -> prerequisite`; absent edges are a no-op
    RemoveDependency {
        task: TaskRef,
        prerequisite: TaskRef,
    },
    CompleteTask {
        task: TaskRef,
    },
    DeleteTask {
        task: TaskRef,
    },
    CreateGroup {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<GroupRef>,
    },
    /// Rename or redescribe a group; an empty description clears it
    UpdateGroup {
        group: GroupRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    DeleteGroup {
        group: GroupRef,
    },
    AddGroupMember {
        group: GroupRef,
        /// User ID to add as a member
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        /// Group to nest under `group`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member_group: Option<GroupRef>,
    },
    RemoveGroupMember {
        group: GroupRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        /// Nested group to detach from `group`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member_group: Option<GroupRef>,
    },
}

impl Intent {
    /// The `op` tag of this intent.
    pub fn op(&self) -> &'static str {
        match self {
            Intent::CreateTask { .. } => "create_task",
            Intent::UpdateTask { .. } => "update_task",
            Intent::SetDependency { .. } => "set_dependency",
            Intent::RemoveDependency { .. } => "remove_dependency",
            Intent::CompleteTask { .. } => "complete_task",
            Intent::DeleteTask { .. } => "delete_task",
            Intent::CreateGroup { .. } => "create_group",
            Intent::UpdateGroup { .. } => "update_group",
            Intent::DeleteGroup { .. } => "delete_group",
            Intent::AddGroupMember { .. } => "add_group_member",
            Intent::RemoveGroupMember { .. } => "remove_group_member",
        }
    }

    /// Shorthand for a bare `create_task` with only a title.
    pub fn create_task(title: impl Into<String>) -> Self {
        Intent::CreateTask {
            title: title.into(),
            description: None,
            urgency: None,
            due_date: None,
            recurrence: None,
            assignee_users: Vec::new(),
            assignee_groups: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Shorthand for an `update_task` that changes nothing yet.
    pub fn update_task(task: TaskRef) -> Self {
        Intent::UpdateTask {
            task,
            title: None,
            description: None,
            urgency: None,
            due_date: None,
            recurrence: None,
            status: None,
            add_assignee_users: Vec::new(),
            remove_assignee_users: Vec::new(),
            add_assignee_groups: Vec::new(),
            remove_assignee_groups: Vec::new(),
        }
    }
}

/// Parse a JSON array of intents.
pub fn parse_batch(json: &str) -> crate::Result<Vec<Intent>> {
    Ok(serde_json::from_str(json)?)
}
