//! Staging of a single intent against a working set.
//!
//! The same code runs twice per committed batch: once while the caller stages
//! intents, and once more inside the commit transaction to re-validate the
//! resolved intents against the state the transaction sees.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::intent::{GroupRef, Intent, TaskRef};
use super::working_set::{View, WorkingSet};
use super::{OperationKind, StagedOperation, Validation};
use crate::models::{
    Group, Recurrence, Task, TaskStatus, Urgency, generate_id, validate_description,
    validate_title,
};
use crate::scope::{self, Action};
use crate::storage::Reader;
use crate::{Error, Result, deps, recurrence};

/// What a placeholder number stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Placeholder {
    Task(String),
    Group(String),
}

impl Placeholder {
    pub fn id(&self) -> &str {
        match self {
            Placeholder::Task(id) | Placeholder::Group(id) => id,
        }
    }
}

/// Identity and placeholder bookkeeping shared by every intent of a batch.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub session_id: String,
    pub user_id: String,
    /// Completion date for recurrence; the current UTC date when unset
    pub today: Option<NaiveDate>,
    pub default_urgency: Urgency,
    next_placeholder: u32,
    pub placeholders: BTreeMap<u32, Placeholder>,
}

impl Context {
    pub fn new(
        session_id: String,
        user_id: String,
        today: Option<NaiveDate>,
        default_urgency: Urgency,
    ) -> Self {
        Self {
            session_id,
            user_id,
            today,
            default_urgency,
            next_placeholder: 1,
            placeholders: BTreeMap::new(),
        }
    }

    /// Same identity, no placeholders allocated yet.
    pub fn fresh(&self) -> Self {
        Self::new(
            self.session_id.clone(),
            self.user_id.clone(),
            self.today,
            self.default_urgency,
        )
    }

    /// Allocate the next placeholder. IDs derive from the session ID and the
    /// placeholder number, so replaying the same intents yields the same IDs.
    fn allocate(&mut self, prefix: &str) -> (u32, String) {
        let n = self.next_placeholder;
        self.next_placeholder += 1;
        let id = generate_id(prefix, &format!("{}:{}", self.session_id, n));
        let placeholder = if prefix == "gp" {
            Placeholder::Group(id.clone())
        } else {
            Placeholder::Task(id.clone())
        };
        self.placeholders.insert(n, placeholder);
        (n, id)
    }
}

/// Result of staging one intent.
#[derive(Debug)]
pub(crate) struct Staged {
    /// The intent with every reference replaced by a concrete ID
    pub resolved: Intent,
    pub operations: Vec<StagedOperation>,
}

pub(crate) struct Stager<'a, R: Reader + ?Sized> {
    base: &'a R,
    ws: &'a mut WorkingSet,
    ctx: &'a mut Context,
    current_task: &'a mut Option<String>,
}

impl<'a, R: Reader + ?Sized> Stager<'a, R> {
    pub fn new(
        base: &'a R,
        ws: &'a mut WorkingSet,
        ctx: &'a mut Context,
        current_task: &'a mut Option<String>,
    ) -> Self {
        Self {
            base,
            ws,
            ctx,
            current_task,
        }
    }

    fn view(&self) -> View<'_, R> {
        self.ws.view(self.base)
    }

    fn user(&self) -> &str {
        &self.ctx.user_id
    }

    // === Reference resolution ===

    fn task_ref(&self, r: &TaskRef) -> Result<String> {
        match r {
            TaskRef::Existing(id) => Ok(id.clone()),
            TaskRef::Pending(n) => match self.ctx.placeholders.get(n) {
                Some(Placeholder::Task(id)) => Ok(id.clone()),
                _ => Err(Error::NotFound(format!(
                    "pending:{n} does not name a task created earlier in this batch"
                ))),
            },
            TaskRef::Current => self.current_task.clone().ok_or_else(|| {
                Error::NotFound("no current task: create or select a task first".to_string())
            }),
        }
    }

    fn group_ref(&self, r: &GroupRef) -> Result<String> {
        match r {
            GroupRef::Existing(id) => Ok(id.clone()),
            GroupRef::Pending(n) => match self.ctx.placeholders.get(n) {
                Some(Placeholder::Group(id)) => Ok(id.clone()),
                _ => Err(Error::NotFound(format!(
                    "pending:{n} does not name a group created earlier in this batch"
                ))),
            },
        }
    }

    fn load_task(&self, id: &str) -> Result<Task> {
        self.view()
            .get_task(id)?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    fn load_group(&self, id: &str) -> Result<Group> {
        self.view()
            .get_group(id)?
            .ok_or_else(|| Error::NotFound(format!("group {id}")))
    }

    fn require_user(&self, id: &str) -> Result<()> {
        match self.view().get_user(id)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("user {id}"))),
        }
    }

    fn require_task(&self, task: &Task, action: Action) -> Result<()> {
        scope::require(&self.view(), self.user(), task, action)
    }

    /// Resolve `r` and check the acting user may at least read it.
    pub fn select(&mut self, r: &TaskRef) -> Result<Task> {
        let id = self.task_ref(r)?;
        let task = self.load_task(&id)?;
        self.require_task(&task, Action::Read)?;
        *self.current_task = Some(task.id.clone());
        Ok(task)
    }

    // === Staging ===

    pub fn stage(&mut self, index: usize, intent: &Intent) -> Result<Staged> {
        if self.view().get_user(self.user())?.is_none() {
            return Err(Error::Unauthorized(format!(
                "unknown user {}",
                self.ctx.user_id
            )));
        }

        let mut operations = Vec::new();
        let resolved = match intent {
            Intent::CreateTask {
                title,
                description,
                urgency,
                due_date,
                recurrence,
                assignee_users,
                assignee_groups,
                depends_on,
            } => self.create_task(
                NewTask {
                    title,
                    description: description.as_deref(),
                    urgency: *urgency,
                    due_date: *due_date,
                    recurrence: *recurrence,
                    assignee_users,
                    assignee_groups,
                    depends_on,
                },
                &mut operations,
            )?,
            Intent::UpdateTask { .. } => self.update_task(intent, &mut operations)?,
            Intent::SetDependency { task, prerequisite } => {
                self.set_dependency(task, prerequisite, &mut operations)?
            }
            Intent::RemoveDependency { task, prerequisite } => {
                self.remove_dependency(task, prerequisite, &mut operations)?
            }
            Intent::CompleteTask { task } => {
                let id = self.task_ref(task)?;
                let loaded = self.load_task(&id)?;
                self.complete(loaded, &mut operations)?;
                *self.current_task = Some(id.clone());
                Intent::CompleteTask {
                    task: TaskRef::Existing(id),
                }
            }
            Intent::DeleteTask { task } => {
                let id = self.task_ref(task)?;
                let loaded = self.load_task(&id)?;
                self.require_task(&loaded, Action::Delete)?;
                self.ws.delete_task(&loaded);
                if self.current_task.as_deref() == Some(id.as_str()) {
                    *self.current_task = None;
                }
                operations.push(op(OperationKind::DeleteTask, &id));
                Intent::DeleteTask {
                    task: TaskRef::Existing(id),
                }
            }
            Intent::CreateGroup {
                name,
                description,
                parent,
            } => self.create_group(name, description.as_deref(), parent.as_ref(), &mut operations)?,
            Intent::UpdateGroup {
                group,
                name,
                description,
            } => self.update_group(group, name.as_deref(), description.as_deref(), &mut operations)?,
            Intent::DeleteGroup { group } => {
                let id = self.group_ref(group)?;
                let loaded = self.load_group(&id)?;
                scope::require_group_owner(self.user(), &loaded)?;
                self.ws.delete_group(&loaded);
                operations.push(op(OperationKind::DeleteGroup, &id));
                Intent::DeleteGroup {
                    group: GroupRef::Existing(id),
                }
            }
            Intent::AddGroupMember {
                group,
                user,
                member_group,
            } => self.add_group_member(group, user.as_deref(), member_group.as_ref(), &mut operations)?,
            Intent::RemoveGroupMember {
                group,
                user,
                member_group,
            } => self.remove_group_member(
                group,
                user.as_deref(),
                member_group.as_ref(),
                &mut operations,
            )?,
        };

        for operation in &mut operations {
            operation.intent_index = index;
        }
        Ok(Staged {
            resolved,
            operations,
        })
    }

    fn create_task(&mut self, new: NewTask<'_>, ops: &mut Vec<StagedOperation>) -> Result<Intent> {
        validate_title(new.title)?;
        if let Some(description) = new.description {
            validate_description(description)?;
        }

        let mut users: Vec<String> = Vec::new();
        for user in new.assignee_users {
            self.require_user(user)?;
            if !users.contains(user) {
                users.push(user.clone());
            }
        }

        let mut groups: Vec<String> = Vec::new();
        for group in new.assignee_groups {
            let id = self.group_ref(group)?;
            self.load_group(&id)?;
            if !groups.contains(&id) {
                groups.push(id);
            }
        }

        let mut prerequisites: Vec<String> = Vec::new();
        for prerequisite in new.depends_on {
            let id = self.task_ref(prerequisite)?;
            let task = self.load_task(&id)?;
            self.require_task(&task, Action::Read)?;
            if !prerequisites.contains(&id) {
                prerequisites.push(id);
            }
        }

        let urgency = new.urgency.unwrap_or(self.ctx.default_urgency);
        let recurrence = new.recurrence.unwrap_or_default();

        let (placeholder, id) = self.ctx.allocate("tk");
        if self.view().get_task(&id)?.is_some() {
            return Err(Error::Conflict(format!("task {id} already exists")));
        }

        let mut task = Task::new(id.clone(), new.title.trim().to_string(), self.ctx.user_id.clone());
        task.description = new.description.map(str::to_string);
        task.urgency = urgency;
        task.due_date = new.due_date;
        task.recurrence = recurrence;
        task.assignee_users = users.clone();
        task.assignee_groups = groups.clone();
        task.prerequisites = prerequisites.clone();
        self.ws.create_task(task);

        *self.current_task = Some(id.clone());
        ops.push(StagedOperation {
            placeholder: Some(placeholder),
            ..op(OperationKind::CreateTask, &id)
        });

        Ok(Intent::CreateTask {
            title: new.title.to_string(),
            description: new.description.map(str::to_string),
            urgency: Some(urgency),
            due_date: new.due_date,
            recurrence: Some(recurrence),
            assignee_users: users,
            assignee_groups: groups.into_iter().map(GroupRef::Existing).collect(),
            depends_on: prerequisites.into_iter().map(TaskRef::Existing).collect(),
        })
    }

    fn update_task(&mut self, intent: &Intent, ops: &mut Vec<StagedOperation>) -> Result<Intent> {
        let Intent::UpdateTask {
            task: task_ref,
            title,
            description,
            urgency,
            due_date,
            recurrence,
            status,
            add_assignee_users,
            remove_assignee_users,
            add_assignee_groups,
            remove_assignee_groups,
        } = intent
        else {
            return Err(Error::Other(format!("expected update_task, got {}", intent.op())));
        };

        let id = self.task_ref(task_ref)?;
        let mut task = self.load_task(&id)?;
        self.require_task(&task, Action::Write)?;

        if let Some(title) = title {
            validate_title(title)?;
            task.title = title.trim().to_string();
        }
        if let Some(description) = description {
            validate_description(description)?;
            task.description = if description.is_empty() {
                None
            } else {
                Some(description.clone())
            };
        }
        if let Some(urgency) = urgency {
            task.urgency = *urgency;
        }
        if let Some(due_date) = due_date {
            task.due_date = Some(*due_date);
        }
        if let Some(recurrence) = recurrence {
            task.recurrence = *recurrence;
        }

        for user in add_assignee_users {
            self.require_user(user)?;
            if !task.assignee_users.contains(user) {
                task.assignee_users.push(user.clone());
            }
        }
        task.assignee_users.retain(|u| !remove_assignee_users.contains(u));

        let mut added_groups = Vec::new();
        for group in add_assignee_groups {
            let group_id = self.group_ref(group)?;
            self.load_group(&group_id)?;
            if !task.assignee_groups.contains(&group_id) {
                task.assignee_groups.push(group_id.clone());
            }
            added_groups.push(group_id);
        }
        let mut removed_groups = Vec::new();
        for group in remove_assignee_groups {
            removed_groups.push(self.group_ref(group)?);
        }
        task.assignee_groups.retain(|g| !removed_groups.contains(g));

        task.updated_at = Utc::now();
        ops.push(op(OperationKind::UpdateTask, &id));

        match status {
            Some(TaskStatus::Completed) => self.complete(task, ops)?,
            Some(other) => {
                if task.is_completed() {
                    deps::require_reopenable(&self.view(), &id)?;
                }
                task.status = *other;
                task.completed_at = None;
                self.ws.put_task(task);
            }
            None => self.ws.put_task(task),
        }

        *self.current_task = Some(id.clone());
        Ok(Intent::UpdateTask {
            task: TaskRef::Existing(id),
            title: title.clone(),
            description: description.clone(),
            urgency: *urgency,
            due_date: *due_date,
            recurrence: *recurrence,
            status: *status,
            add_assignee_users: add_assignee_users.clone(),
            remove_assignee_users: remove_assignee_users.clone(),
            add_assignee_groups: added_groups.into_iter().map(GroupRef::Existing).collect(),
            remove_assignee_groups: removed_groups.into_iter().map(GroupRef::Existing).collect(),
        })
    }

    /// Completion path shared by `complete_task` and `update_task{status: completed}`.
    fn complete(&mut self, mut task: Task, ops: &mut Vec<StagedOperation>) -> Result<()> {
        self.require_task(&task, Action::Complete)?;
        if task.is_completed() {
            return Err(Error::InvalidInput(format!("task {} is already completed", task.id)));
        }
        deps::require_completable(&self.view(), &task)?;

        let now = Utc::now();
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.updated_at = now;

        let completed_on = self.ctx.today.unwrap_or_else(|| now.date_naive());
        let next = recurrence::next_occurrence(&task, completed_on)?;
        let completed_id = task.id.clone();
        self.ws.put_task(task);
        ops.push(op(OperationKind::CompleteTask, &completed_id));

        if let Some(draft) = next {
            let (placeholder, id) = self.ctx.allocate("tk");
            if self.view().get_task(&id)?.is_some() {
                return Err(Error::Conflict(format!("task {id} already exists")));
            }
            tracing::debug!(task = %completed_id, next = %id, due = ?draft.due_date, "staging next occurrence");
            self.ws.create_task(Task::from_draft(id.clone(), draft));
            ops.push(StagedOperation {
                placeholder: Some(placeholder),
                spawned_from: Some(completed_id),
                ..op(OperationKind::CreateTask, &id)
            });
        }
        Ok(())
    }

    fn set_dependency(
        &mut self,
        task_ref: &TaskRef,
        prerequisite_ref: &TaskRef,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let id = self.task_ref(task_ref)?;
        let prerequisite_id = self.task_ref(prerequisite_ref)?;
        let mut task = self.load_task(&id)?;
        let prerequisite = self.load_task(&prerequisite_id)?;
        self.require_task(&task, Action::Write)?;
        self.require_task(&prerequisite, Action::Read)?;

        if !task.prerequisites.contains(&prerequisite_id) {
            deps::check_prerequisite(&self.view(), &id, &prerequisite_id)?;
            deps::require_edge_keeps_completion(&task, &prerequisite)?;
            task.prerequisites.push(prerequisite_id.clone());
            task.updated_at = Utc::now();
            self.ws.put_task(task);
        }

        *self.current_task = Some(id.clone());
        ops.push(op(OperationKind::SetDependency, &id));
        Ok(Intent::SetDependency {
            task: TaskRef::Existing(id),
            prerequisite: TaskRef::Existing(prerequisite_id),
        })
    }

    fn remove_dependency(
        &mut self,
        task_ref: &TaskRef,
        prerequisite_ref: &TaskRef,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let id = self.task_ref(task_ref)?;
        let prerequisite_id = self.task_ref(prerequisite_ref)?;
        let mut task = self.load_task(&id)?;
        self.load_task(&prerequisite_id)?;
        self.require_task(&task, Action::Write)?;

        // Dropping an edge never breaks completion order or acyclicity.
        if task.prerequisites.contains(&prerequisite_id) {
            task.prerequisites.retain(|p| p != &prerequisite_id);
            task.updated_at = Utc::now();
            self.ws.put_task(task);
        }

        *self.current_task = Some(id.clone());
        ops.push(op(OperationKind::RemoveDependency, &id));
        Ok(Intent::RemoveDependency {
            task: TaskRef::Existing(id),
            prerequisite: TaskRef::Existing(prerequisite_id),
        })
    }

    fn create_group(
        &mut self,
        name: &str,
        description: Option<&str>,
        parent: Option<&GroupRef>,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("group name must not be empty".to_string()));
        }
        if let Some(description) = description {
            validate_description(description)?;
        }
        if self.view().find_group_by_name(name)?.is_some() {
            return Err(Error::Conflict(format!("group '{name}' already exists")));
        }

        let parent_id = match parent {
            Some(r) => {
                let parent_id = self.group_ref(r)?;
                let parent = self.load_group(&parent_id)?;
                scope::require_group_owner(self.user(), &parent)?;
                Some(parent_id)
            }
            None => None,
        };

        let (placeholder, id) = self.ctx.allocate("gp");
        if self.view().get_group(&id)?.is_some() {
            return Err(Error::Conflict(format!("group {id} already exists")));
        }
        if let Some(parent_id) = &parent_id {
            scope::check_group_parent(&self.view(), &id, parent_id)?;
        }

        let mut group = Group::new(id.clone(), name.to_string(), self.ctx.user_id.clone());
        group.description = description.map(str::to_string);
        group.parent = parent_id.clone();
        self.ws.create_group(group);

        ops.push(StagedOperation {
            placeholder: Some(placeholder),
            ..op(OperationKind::CreateGroup, &id)
        });
        Ok(Intent::CreateGroup {
            name: name.to_string(),
            description: description.map(str::to_string),
            parent: parent_id.map(GroupRef::Existing),
        })
    }

    fn update_group(
        &mut self,
        group_ref: &GroupRef,
        name: Option<&str>,
        description: Option<&str>,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let id = self.group_ref(group_ref)?;
        let mut group = self.load_group(&id)?;
        scope::require_group_owner(self.user(), &group)?;

        let name = name.map(str::trim);
        if let Some(name) = name {
            if name.is_empty() {
                return Err(Error::InvalidInput("group name must not be empty".to_string()));
            }
            if name != group.name && self.view().find_group_by_name(name)?.is_some() {
                return Err(Error::Conflict(format!("group '{name}' already exists")));
            }
            group.name = name.to_string();
        }
        if let Some(description) = description {
            validate_description(description)?;
            group.description = if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            };
        }
        group.updated_at = Utc::now();
        self.ws.put_group(group);

        ops.push(op(OperationKind::UpdateGroup, &id));
        Ok(Intent::UpdateGroup {
            group: GroupRef::Existing(id),
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        })
    }

    fn add_group_member(
        &mut self,
        group_ref: &GroupRef,
        user: Option<&str>,
        member_group: Option<&GroupRef>,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let group_id = self.group_ref(group_ref)?;
        let group = self.load_group(&group_id)?;
        scope::require_group_owner(self.user(), &group)?;

        let resolved = match (user, member_group) {
            (Some(user_id), None) => {
                self.require_user(user_id)?;
                if !self.view().user_group_ids(user_id)?.contains(&group_id) {
                    self.ws.add_membership(&group_id, user_id);
                }
                Intent::AddGroupMember {
                    group: GroupRef::Existing(group_id.clone()),
                    user: Some(user_id.to_string()),
                    member_group: None,
                }
            }
            (None, Some(member)) => {
                let child_id = self.group_ref(member)?;
                let mut child = self.load_group(&child_id)?;
                scope::require_group_owner(self.user(), &child)?;
                if child.parent.as_deref() != Some(group_id.as_str()) {
                    scope::check_group_parent(&self.view(), &child_id, &group_id)?;
                    child.parent = Some(group_id.clone());
                    child.updated_at = Utc::now();
                    self.ws.put_group(child);
                }
                Intent::AddGroupMember {
                    group: GroupRef::Existing(group_id.clone()),
                    user: None,
                    member_group: Some(GroupRef::Existing(child_id)),
                }
            }
            _ => {
                return Err(Error::InvalidInput(
                    "add_group_member needs exactly one of user or member_group".to_string(),
                ));
            }
        };

        ops.push(op(OperationKind::AddGroupMember, &group_id));
        Ok(resolved)
    }

    fn remove_group_member(
        &mut self,
        group_ref: &GroupRef,
        user: Option<&str>,
        member_group: Option<&GroupRef>,
        ops: &mut Vec<StagedOperation>,
    ) -> Result<Intent> {
        let group_id = self.group_ref(group_ref)?;
        let group = self.load_group(&group_id)?;
        scope::require_group_owner(self.user(), &group)?;

        let resolved = match (user, member_group) {
            (Some(user_id), None) => {
                self.require_user(user_id)?;
                if !self.view().user_group_ids(user_id)?.contains(&group_id) {
                    return Err(Error::NotFound(format!(
                        "user {user_id} is not a member of group {group_id}"
                    )));
                }
                self.ws.remove_membership(&group_id, user_id);
                Intent::RemoveGroupMember {
                    group: GroupRef::Existing(group_id.clone()),
                    user: Some(user_id.to_string()),
                    member_group: None,
                }
            }
            (None, Some(member)) => {
                let child_id = self.group_ref(member)?;
                let mut child = self.load_group(&child_id)?;
                scope::require_group_owner(self.user(), &child)?;
                if child.parent.as_deref() != Some(group_id.as_str()) {
                    return Err(Error::NotFound(format!(
                        "group {child_id} is not nested under group {group_id}"
                    )));
                }
                child.parent = None;
                child.updated_at = Utc::now();
                self.ws.put_group(child);
                Intent::RemoveGroupMember {
                    group: GroupRef::Existing(group_id.clone()),
                    user: None,
                    member_group: Some(GroupRef::Existing(child_id)),
                }
            }
            _ => {
                return Err(Error::InvalidInput(
                    "remove_group_member needs exactly one of user or member_group".to_string(),
                ));
            }
        };

        ops.push(op(OperationKind::RemoveGroupMember, &group_id));
        Ok(resolved)
    }
}

/// Borrowed fields of a `create_task` intent.
struct NewTask<'i> {
    title: &'i str,
    description: Option<&'i str>,
    urgency: Option<Urgency>,
    due_date: Option<NaiveDate>,
    recurrence: Option<Recurrence>,
    assignee_users: &'i [String],
    assignee_groups: &'i [GroupRef],
    depends_on: &'i [TaskRef],
}

fn op(kind: OperationKind, target: &str) -> StagedOperation {
    StagedOperation {
        intent_index: 0,
        kind,
        target: target.to_string(),
        placeholder: None,
        spawned_from: None,
        validation: Validation::Pending,
    }
}
