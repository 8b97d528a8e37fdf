//! Command implementations for the SmartTodo CLI.
//!
//! Read-only commands query the store directly. Every mutation is expressed
//! as intents and run through a [`Session`], so a one-line `todo task create`
//! gets exactly the authorization, graph checks and atomic commit a
//! multi-intent `todo batch` does.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

use crate::config::ResolvedConfig;
use crate::deps;
use crate::models::{Group, Recurrence, Task, TaskStatus, Urgency, User};
use crate::scope::{self, Action};
use crate::session::{
    GroupRef, Intent, Outcome, Session, SessionOptions, StagedOperation, TaskRef,
};
use crate::storage::{Reader, SqliteStore};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;

    /// Reason the command failed after producing output, if it did.
    fn failure(&self) -> Option<String> {
        None
    }
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
}

/// An opened database plus the configuration it was resolved from.
pub struct Workspace {
    store: SqliteStore,
    config: ResolvedConfig,
}

impl Workspace {
    /// Open the configured database, which must already exist.
    pub fn open(config: ResolvedConfig) -> Result<Self> {
        let store = SqliteStore::open_existing(config.database())?;
        Ok(Self { store, config })
    }

    pub fn with_store(store: SqliteStore, config: ResolvedConfig) -> Self {
        Self { store, config }
    }

    fn options(&self) -> SessionOptions {
        SessionOptions {
            max_intents: self.config.max_intents.value,
            default_urgency: self.config.default_urgency.value,
        }
    }

    /// The user named by `--as` / `TODO_USER`, by ID or name.
    pub fn acting_user(&self) -> Result<User> {
        let Some(name) = self.config.user() else {
            return Err(Error::Unauthorized(
                "no acting user: pass --as or set TODO_USER".to_string(),
            ));
        };
        self.find_user(name)?
            .ok_or_else(|| Error::Unauthorized(format!("unknown user '{name}'")))
    }

    fn find_user(&self, id_or_name: &str) -> Result<Option<User>> {
        match self.store.get_user(id_or_name)? {
            Some(user) => Ok(Some(user)),
            None => self.store.find_user_by_name(id_or_name),
        }
    }

    fn find_group(&self, id_or_name: &str) -> Result<Option<Group>> {
        match self.store.get_group(id_or_name)? {
            Some(group) => Ok(Some(group)),
            None => self.store.find_group_by_name(id_or_name),
        }
    }

    /// Map a user name to its ID. Unknown names pass through so the session
    /// reports them.
    fn user_id(&self, id_or_name: &str) -> Result<String> {
        Ok(self
            .find_user(id_or_name)?
            .map(|u| u.id)
            .unwrap_or_else(|| id_or_name.to_string()))
    }

    fn group_ref(&self, id_or_name: &str) -> Result<GroupRef> {
        match self.find_group(id_or_name)? {
            Some(group) => Ok(GroupRef::Existing(group.id)),
            None => id_or_name.parse(),
        }
    }

    fn user_ids(&self, names: &[String]) -> Result<Vec<String>> {
        names.iter().map(|n| self.user_id(n)).collect()
    }

    fn group_refs(&self, names: &[String]) -> Result<Vec<GroupRef>> {
        names.iter().map(|n| self.group_ref(n)).collect()
    }

    /// Run intents as one session for the acting user.
    pub fn run(&mut self, intents: Vec<Intent>) -> Result<BatchResult> {
        let user = self.acting_user()?;
        let mut session = Session::new(user.id, self.options());
        let outcome = session.run(&mut self.store, intents)?;
        Ok(BatchResult { outcome })
    }

    /// Stage intents without committing.
    pub fn dry_run(&mut self, intents: Vec<Intent>) -> Result<DryRunResult> {
        let user = self.acting_user()?;
        let mut session = Session::new(user.id, self.options());
        for intent in intents {
            if session.stage(&self.store, intent).is_err() {
                break;
            }
        }
        let operations = session.operations().to_vec();
        let outcome = match session.outcome() {
            Some(outcome) => outcome.clone(),
            None => session.discard()?,
        };
        Ok(DryRunResult {
            operations,
            outcome,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("invalid date '{s}': expected YYYY-MM-DD")))
}

fn parse_opt<T>(value: Option<&str>, parse: impl Fn(&str) -> Result<T>) -> Result<Option<T>> {
    value.map(parse).transpose()
}

fn task_refs(ids: &[String]) -> Result<Vec<TaskRef>> {
    ids.iter().map(|id| id.parse()).collect()
}

// === Batch results ===

/// Result of running a session to completion.
#[derive(Debug)]
pub struct BatchResult {
    pub outcome: Outcome,
}

impl Output for BatchResult {
    fn to_json(&self) -> String {
        json(&self.outcome)
    }

    fn to_human(&self) -> String {
        match &self.outcome {
            Outcome::Committed {
                session_id,
                created_ids,
                updated_ids,
                deleted_ids,
                placeholders,
            } => {
                let mut lines = vec![format!(
                    "Committed batch {}: {} created, {} updated, {} deleted",
                    session_id,
                    created_ids.len(),
                    updated_ids.len(),
                    deleted_ids.len()
                )];
                for (n, id) in placeholders {
                    lines.push(format!("  pending:{} -> {}", n, id));
                }
                for id in updated_ids {
                    lines.push(format!("  updated {}", id));
                }
                for id in deleted_ids {
                    lines.push(format!("  deleted {}", id));
                }
                lines.join("\n")
            }
            Outcome::Aborted {
                session_id,
                reason,
                kind,
                failing_intent_index,
            } => match failing_intent_index {
                Some(index) => format!(
                    "Aborted batch {} at intent {}: {} [{}]",
                    session_id, index, reason, kind
                ),
                None => format!("Aborted batch {}: {} [{}]", session_id, reason, kind),
            },
        }
    }

    fn failure(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Committed { .. } => None,
            Outcome::Aborted { reason, .. } => Some(reason.clone()),
        }
    }
}

/// Staged operations of a batch that was validated but not committed.
#[derive(Debug, Serialize)]
pub struct DryRunResult {
    pub operations: Vec<StagedOperation>,
    pub outcome: Outcome,
}

impl DryRunResult {
    fn rejected(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            Outcome::Aborted { reason, kind, .. } if kind != "discarded" => Some((reason, kind)),
            _ => None,
        }
    }
}

impl Output for DryRunResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for op in &self.operations {
            let mut line = format!(
                "  #{} {} {}",
                op.intent_index,
                serde_json::to_value(op.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                op.target
            );
            if let Some(n) = op.placeholder {
                line.push_str(&format!(" (pending:{})", n));
            }
            lines.push(line);
        }
        let header = match self.rejected() {
            Some((reason, kind)) => format!("Batch would abort: {} [{}]", reason, kind),
            None => format!("Batch would apply {} operation(s)", self.operations.len()),
        };
        std::iter::once(header).chain(lines).collect::<Vec<_>>().join("\n")
    }

    fn failure(&self) -> Option<String> {
        self.rejected().map(|(reason, _)| reason.to_string())
    }
}

// === Init ===

#[derive(Serialize)]
pub struct InitResult {
    pub initialized: bool,
    pub database: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.initialized {
            format!("Initialized SmartTodo database at {}", self.database)
        } else {
            format!("SmartTodo database already exists at {}", self.database)
        }
    }
}

/// Create the configured database if missing.
pub fn init(config: &ResolvedConfig) -> Result<InitResult> {
    let path = config.database();
    let existed = path.exists();
    SqliteStore::open(path)?;
    Ok(InitResult {
        initialized: !existed,
        database: path.display().to_string(),
    })
}

// === Users ===

#[derive(Serialize)]
pub struct UserResult {
    #[serde(flatten)]
    pub user: User,
}

impl Output for UserResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Added user {} ({})", self.user.name, self.user.id)
    }
}

pub fn user_add(ws: &mut Workspace, name: &str, credential_hash: &str) -> Result<UserResult> {
    let user = ws.store.create_user(name, credential_hash)?;
    tracing::info!(user = %user.id, "user registered");
    Ok(UserResult { user })
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

impl Output for UserList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.users.is_empty() {
            return "No users.".to_string();
        }
        self.users
            .iter()
            .map(|u| format!("{}  {}", u.id, u.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn user_list(ws: &Workspace) -> Result<UserList> {
    let users = ws.store.list_users()?;
    Ok(UserList {
        count: users.len(),
        users,
    })
}

// === Groups ===

#[derive(Serialize)]
pub struct GroupList {
    pub groups: Vec<Group>,
    pub count: usize,
}

impl Output for GroupList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.groups.is_empty() {
            return "No groups.".to_string();
        }
        self.groups
            .iter()
            .map(|g| match &g.parent {
                Some(parent) => format!("{}  {}  (in {})", g.id, g.name, parent),
                None => format!("{}  {}", g.id, g.name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn group_list(ws: &Workspace) -> Result<GroupList> {
    let groups = ws.store.list_groups()?;
    Ok(GroupList {
        count: groups.len(),
        groups,
    })
}

#[derive(Serialize)]
pub struct GroupShow {
    pub group: Group,
    /// Direct user members
    pub members: Vec<User>,
    /// Groups nested directly under this one
    pub subgroups: Vec<Group>,
}

impl Output for GroupShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} {}", self.group.id, self.group.name)];
        if let Some(ref description) = self.group.description {
            lines.push(format!("  {}", description));
        }
        if let Some(ref parent) = self.group.parent {
            lines.push(format!("  Parent: {}", parent));
        }
        lines.push(format!("  Created by: {}", self.group.created_by));
        let members: Vec<&str> = self.members.iter().map(|u| u.name.as_str()).collect();
        lines.push(format!("  Members: {}", if members.is_empty() { "-".to_string() } else { members.join(", ") }));
        let subgroups: Vec<&str> = self.subgroups.iter().map(|g| g.name.as_str()).collect();
        if !subgroups.is_empty() {
            lines.push(format!("  Subgroups: {}", subgroups.join(", ")));
        }
        lines.join("\n")
    }
}

pub fn group_show(ws: &Workspace, group: &str) -> Result<GroupShow> {
    let group = ws
        .find_group(group)?
        .ok_or_else(|| Error::NotFound(format!("group '{group}'")))?;
    let mut members = Vec::new();
    for id in ws.store.group_member_ids(&group.id)? {
        if let Some(user) = ws.store.get_user(&id)? {
            members.push(user);
        }
    }
    let subgroups = ws
        .store
        .list_groups()?
        .into_iter()
        .filter(|g| g.parent.as_deref() == Some(group.id.as_str()))
        .collect();
    Ok(GroupShow {
        group,
        members,
        subgroups,
    })
}

pub fn group_create(
    ws: &mut Workspace,
    name: &str,
    description: Option<String>,
    parent: Option<&str>,
) -> Result<BatchResult> {
    let parent = parent.map(|p| ws.group_ref(p)).transpose()?;
    ws.run(vec![Intent::CreateGroup {
        name: name.to_string(),
        description,
        parent,
    }])
}

pub fn group_update(
    ws: &mut Workspace,
    group: &str,
    name: Option<String>,
    description: Option<String>,
) -> Result<BatchResult> {
    let group = ws.group_ref(group)?;
    ws.run(vec![Intent::UpdateGroup {
        group,
        name,
        description,
    }])
}

pub fn group_delete(ws: &mut Workspace, group: &str) -> Result<BatchResult> {
    let group = ws.group_ref(group)?;
    ws.run(vec![Intent::DeleteGroup { group }])
}

pub fn group_add_member(
    ws: &mut Workspace,
    group: &str,
    user: Option<&str>,
    member_group: Option<&str>,
) -> Result<BatchResult> {
    let intent = Intent::AddGroupMember {
        group: ws.group_ref(group)?,
        user: user.map(|u| ws.user_id(u)).transpose()?,
        member_group: member_group.map(|g| ws.group_ref(g)).transpose()?,
    };
    ws.run(vec![intent])
}

pub fn group_remove_member(
    ws: &mut Workspace,
    group: &str,
    user: Option<&str>,
    member_group: Option<&str>,
) -> Result<BatchResult> {
    let intent = Intent::RemoveGroupMember {
        group: ws.group_ref(group)?,
        user: user.map(|u| ws.user_id(u)).transpose()?,
        member_group: member_group.map(|g| ws.group_ref(g)).transpose()?,
    };
    ws.run(vec![intent])
}

// === Tasks ===

fn task_line(task: &Task) -> String {
    let mut line = format!(
        "{} [{}] {} \"{}\"",
        task.id, task.status, task.urgency, task.title
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {}", due));
    }
    if task.recurrence.is_recurring() {
        line.push_str(&format!(" ({})", task.recurrence));
    }
    line
}

#[derive(Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub count: usize,
}

impl Output for TaskList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks.".to_string();
        }
        self.tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
    }
}

/// Tasks the acting user may read, most urgent first.
pub fn task_list(ws: &Workspace, status: Option<&str>, ready: bool) -> Result<TaskList> {
    let user = ws.acting_user()?;
    let status = parse_opt(status, TaskStatus::parse)?;

    let mut tasks = Vec::new();
    for task in ws.store.list_tasks()? {
        if status.is_some_and(|s| task.status != s) {
            continue;
        }
        if ready && (task.is_completed() || !deps::can_complete(&ws.store, &task)?) {
            continue;
        }
        if scope::authorize(&ws.store, &user.id, &task, Action::Read)? {
            tasks.push(task);
        }
    }
    Ok(TaskList {
        count: tasks.len(),
        tasks,
    })
}

#[derive(Serialize)]
pub struct TaskShow {
    #[serde(flatten)]
    pub task: Task,
    /// First prerequisite that still has to be completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
}

impl Output for TaskShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![task_line(task)];
        if let Some(ref description) = task.description {
            lines.push(format!("  {}", description));
        }
        lines.push(format!("  Owner: {}", task.owner));
        if !task.assignee_users.is_empty() {
            lines.push(format!("  Assigned users: {}", task.assignee_users.join(", ")));
        }
        if !task.assignee_groups.is_empty() {
            lines.push(format!("  Assigned groups: {}", task.assignee_groups.join(", ")));
        }
        if !task.prerequisites.is_empty() {
            lines.push(format!("  Depends on: {}", task.prerequisites.join(", ")));
        }
        if let Some(ref blocker) = self.blocked_by {
            lines.push(format!("  Blocked by: {}", blocker));
        }
        lines.join("\n")
    }
}

pub fn task_show(ws: &Workspace, id: &str) -> Result<TaskShow> {
    let user = ws.acting_user()?;
    let task = ws
        .store
        .get_task(id)?
        .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
    scope::require(&ws.store, &user.id, &task, Action::Read)?;
    let blocked_by = deps::first_unmet_prerequisite(&ws.store, &task)?;
    Ok(TaskShow { task, blocked_by })
}

/// Attribute changes shared by `task create` and `task update`.
#[derive(Debug, Default, Clone)]
pub struct TaskFields {
    pub description: Option<String>,
    pub urgency: Option<String>,
    pub due: Option<String>,
    pub recurrence: Option<String>,
}

pub fn task_create(
    ws: &mut Workspace,
    title: &str,
    fields: TaskFields,
    assign_users: &[String],
    assign_groups: &[String],
    depends_on: &[String],
) -> Result<BatchResult> {
    let intent = Intent::CreateTask {
        title: title.to_string(),
        description: fields.description,
        urgency: parse_opt(fields.urgency.as_deref(), Urgency::parse)?,
        due_date: parse_opt(fields.due.as_deref(), parse_date)?,
        recurrence: parse_opt(fields.recurrence.as_deref(), Recurrence::parse)?,
        assignee_users: ws.user_ids(assign_users)?,
        assignee_groups: ws.group_refs(assign_groups)?,
        depends_on: task_refs(depends_on)?,
    };
    ws.run(vec![intent])
}

/// Changes for `task update` beyond the shared fields.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub status: Option<String>,
    pub add_users: Vec<String>,
    pub remove_users: Vec<String>,
    pub add_groups: Vec<String>,
    pub remove_groups: Vec<String>,
}

pub fn task_update(
    ws: &mut Workspace,
    id: &str,
    fields: TaskFields,
    update: TaskUpdate,
) -> Result<BatchResult> {
    let intent = Intent::UpdateTask {
        task: id.parse()?,
        title: update.title,
        description: fields.description,
        urgency: parse_opt(fields.urgency.as_deref(), Urgency::parse)?,
        due_date: parse_opt(fields.due.as_deref(), parse_date)?,
        recurrence: parse_opt(fields.recurrence.as_deref(), Recurrence::parse)?,
        status: parse_opt(update.status.as_deref(), TaskStatus::parse)?,
        add_assignee_users: ws.user_ids(&update.add_users)?,
        remove_assignee_users: ws.user_ids(&update.remove_users)?,
        add_assignee_groups: ws.group_refs(&update.add_groups)?,
        remove_assignee_groups: ws.group_refs(&update.remove_groups)?,
    };
    ws.run(vec![intent])
}

pub fn task_complete(ws: &mut Workspace, id: &str) -> Result<BatchResult> {
    ws.run(vec![Intent::CompleteTask { task: id.parse()? }])
}

pub fn task_delete(ws: &mut Workspace, id: &str) -> Result<BatchResult> {
    ws.run(vec![Intent::DeleteTask { task: id.parse()? }])
}

pub fn dep_add(ws: &mut Workspace, task: &str, prerequisite: &str) -> Result<BatchResult> {
    ws.run(vec![Intent::SetDependency {
        task: task.parse()?,
        prerequisite: prerequisite.parse()?,
    }])
}

pub fn dep_remove(ws: &mut Workspace, task: &str, prerequisite: &str) -> Result<BatchResult> {
    ws.run(vec![Intent::RemoveDependency {
        task: task.parse()?,
        prerequisite: prerequisite.parse()?,
    }])
}

// === Batch ===

/// Read a JSON array of intents from a file, or stdin for `None` / "-".
pub fn read_batch(file: Option<&Path>) -> Result<Vec<Intent>> {
    let text = match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => std::io::read_to_string(std::io::stdin())?,
    };
    crate::session::intent::parse_batch(&text)
}

pub fn batch(ws: &mut Workspace, intents: Vec<Intent>, dry_run: bool) -> Result<Box<dyn Output>> {
    if dry_run {
        Ok(Box::new(ws.dry_run(intents)?))
    } else {
        Ok(Box::new(ws.run(intents)?))
    }
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

#[derive(Serialize)]
pub struct ConfigShow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref file) = self.config_file {
            lines.push(format!("Config file: {}", file));
        }
        for entry in &self.settings {
            lines.push(format!("{:<16} {}  ({})", entry.key, entry.value, entry.source));
        }
        lines.join("\n")
    }
}

pub fn config_show(config: &ResolvedConfig, config_file: Option<&Path>) -> ConfigShow {
    fn entry<T: ToString>(key: &'static str, r: &crate::config::Resolved<T>) -> ConfigEntry {
        ConfigEntry {
            key,
            value: r.value.to_string(),
            source: r.source.to_string(),
        }
    }

    let mut settings = vec![ConfigEntry {
        key: "database",
        value: config.database.value.display().to_string(),
        source: config.database.source.to_string(),
    }];
    if let Some(ref user) = config.user {
        settings.push(entry("user", user));
    }
    settings.push(entry("output-format", &config.output_format));
    settings.push(entry("log-level", &config.log_level));
    settings.push(entry("default-urgency", &config.default_urgency));
    settings.push(entry("max-intents", &config.max_intents));
    settings.push(entry("action-log", &config.action_log));
    settings.push(ConfigEntry {
        key: "action-log-path",
        value: config.action_log_path.value.display().to_string(),
        source: config.action_log_path.source.to_string(),
    });

    ConfigShow {
        config_file: config_file.map(|p| p.display().to_string()),
        settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, TodoConfig, resolve_config_with_env};
    use crate::test_utils::{seed_group, seed_user};

    fn workspace(user: Option<&str>) -> Workspace {
        let mut overrides = ConfigOverrides::new().with_database("/unused/todo.db");
        if let Some(user) = user {
            overrides = overrides.with_user(user);
        }
        let config = resolve_config_with_env(&TodoConfig::default(), &overrides, |_| None);
        Workspace::with_store(SqliteStore::open_in_memory().unwrap(), config)
    }

    fn created_id(result: &BatchResult) -> String {
        result.outcome.placeholder(1).unwrap().to_string()
    }

    #[test]
    fn test_acting_user_by_name_or_id() {
        let mut ws = workspace(Some("alice"));
        let alice = seed_user(&mut ws.store, "alice");
        assert_eq!(ws.acting_user().unwrap().id, alice.id);

        let mut ws = Workspace::with_store(
            SqliteStore::open_in_memory().unwrap(),
            resolve_config_with_env(
                &TodoConfig::default(),
                &ConfigOverrides::new().with_user("nobody"),
                |_| None,
            ),
        );
        seed_user(&mut ws.store, "alice");
        assert!(matches!(ws.acting_user(), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_mutations_need_an_acting_user() {
        let mut ws = workspace(None);
        let err = task_create(&mut ws, "Orphan", TaskFields::default(), &[], &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_create_then_show_and_list() {
        let mut ws = workspace(Some("alice"));
        seed_user(&mut ws.store, "alice");

        let fields = TaskFields {
            urgency: Some("high".to_string()),
            due: Some("2025-01-20".to_string()),
            recurrence: Some("weekly".to_string()),
            ..TaskFields::default()
        };
        let result = task_create(&mut ws, "Water plants", fields, &[], &[], &[]).unwrap();
        assert!(result.failure().is_none());
        let id = created_id(&result);

        let shown = task_show(&ws, &id).unwrap();
        assert_eq!(shown.task.urgency, Urgency::High);
        assert_eq!(shown.task.recurrence, Recurrence::Weekly);
        assert!(shown.to_human().contains("(weekly)"));

        let list = task_list(&ws, None, false).unwrap();
        assert_eq!(list.count, 1);
    }

    #[test]
    fn test_invalid_cli_values_are_rejected_before_staging() {
        let mut ws = workspace(Some("alice"));
        seed_user(&mut ws.store, "alice");
        let fields = TaskFields {
            due: Some("20/01/2025".to_string()),
            ..TaskFields::default()
        };
        let err = task_create(&mut ws, "Bad date", fields, &[], &[], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_list_hides_tasks_outside_scope() {
        let mut ws = workspace(Some("bob"));
        seed_user(&mut ws.store, "bob");
        let alice = seed_user(&mut ws.store, "alice");
        crate::test_utils::seed_task(&mut ws.store, "Private", &alice.id);

        assert_eq!(task_list(&ws, None, false).unwrap().count, 0);
        let id = ws.store.list_tasks().unwrap()[0].id.clone();
        assert!(matches!(task_show(&ws, &id), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_ready_filter_and_blocked_by() {
        let mut ws = workspace(Some("alice"));
        seed_user(&mut ws.store, "alice");
        let first = created_id(&task_create(&mut ws, "First", TaskFields::default(), &[], &[], &[]).unwrap());
        let second = created_id(
            &task_create(&mut ws, "Second", TaskFields::default(), &[], &[], &[first.clone()]).unwrap(),
        );

        let ready = task_list(&ws, None, true).unwrap();
        assert_eq!(ready.count, 1);
        assert_eq!(ready.tasks[0].id, first);
        assert_eq!(task_show(&ws, &second).unwrap().blocked_by, Some(first.clone()));

        let result = task_complete(&mut ws, &second).unwrap();
        match result.outcome {
            Outcome::Aborted { ref kind, .. } => assert_eq!(kind, "dependency_not_met"),
            ref other => panic!("expected abort, got {other:?}"),
        }
        assert!(result.failure().is_some());
        assert!(result.to_human().starts_with("Aborted batch"));
    }

    #[test]
    fn test_group_names_resolve_to_ids() {
        let mut ws = workspace(Some("alice"));
        let alice = seed_user(&mut ws.store, "alice");
        seed_user(&mut ws.store, "bob");

        let result = group_create(&mut ws, "ops", None, None).unwrap();
        assert!(result.outcome.is_committed());
        let result = group_add_member(&mut ws, "ops", Some("bob"), None).unwrap();
        assert!(result.outcome.is_committed());

        let shown = group_show(&ws, "ops").unwrap();
        assert_eq!(shown.group.created_by, alice.id);
        assert_eq!(shown.members.len(), 1);
        assert_eq!(shown.members[0].name, "bob");
    }

    #[test]
    fn test_group_show_lists_subgroups() {
        let mut ws = workspace(Some("alice"));
        let alice = seed_user(&mut ws.store, "alice");
        let parent = seed_group(&mut ws.store, "eng", None, &alice.id);
        seed_group(&mut ws.store, "sre", Some(&parent.id), &alice.id);

        let shown = group_show(&ws, &parent.id).unwrap();
        assert_eq!(shown.subgroups.len(), 1);
        assert!(shown.to_human().contains("Subgroups: sre"));
        assert!(matches!(group_show(&ws, "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_dry_run_stages_without_writing() {
        let mut ws = workspace(Some("alice"));
        seed_user(&mut ws.store, "alice");
        let intents = vec![Intent::create_task("A"), Intent::create_task("B")];

        let result = ws.dry_run(intents).unwrap();
        assert_eq!(result.operations.len(), 2);
        assert!(result.failure().is_none());
        assert!(ws.store.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_reports_rejection() {
        let mut ws = workspace(Some("alice"));
        seed_user(&mut ws.store, "alice");
        let intents = vec![Intent::CompleteTask {
            task: TaskRef::Pending(4),
        }];
        let result = ws.dry_run(intents).unwrap();
        assert!(result.failure().is_some());
        assert!(result.to_human().starts_with("Batch would abort"));
    }

    #[test]
    fn test_config_show_lists_sources() {
        let config = resolve_config_with_env(
            &TodoConfig::default(),
            &ConfigOverrides::new().with_database("/tmp/x.db"),
            |_| None,
        );
        let shown = config_show(&config, None);
        assert_eq!(shown.settings[0].key, "database");
        assert_eq!(shown.settings[0].source, "cli");
        assert!(shown.to_human().contains("max-intents"));
    }
}
