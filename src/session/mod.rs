//! Staged command sessions.
//!
//! A [`Session`] accepts an ordered batch of [`Intent`]s from one user. Each
//! intent is authorized and validated against a [`WorkingSet`] layered over
//! the persisted state, then recorded as [`StagedOperation`]s. Nothing touches
//! the store until [`Session::commit`], which re-validates the whole batch
//! inside one storage transaction and writes it as a unit.
//!
//! The first failing intent ends the session: it moves to
//! [`SessionState::Completed`] with the failure recorded and nothing persisted.

pub mod intent;
mod stage;
pub mod working_set;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;

use crate::models::{Task, Urgency};
use crate::storage::{Reader, Store};
use crate::{Error, Result};

pub use intent::{GroupRef, Intent, TaskRef};
pub use stage::Placeholder;
pub use working_set::WorkingSet;

use stage::{Context, Stager};

/// Default cap on the number of intents in one batch.
pub const DEFAULT_MAX_INTENTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingCommand,
    EditingTask,
    Completed,
}

/// Kind of a staged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateTask,
    UpdateTask,
    SetDependency,
    RemoveDependency,
    CompleteTask,
    DeleteTask,
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
    AddGroupMember,
    RemoveGroupMember,
}

impl OperationKind {
    fn of(intent: &Intent) -> Self {
        match intent {
            Intent::CreateTask { .. } => Self::CreateTask,
            Intent::UpdateTask { .. } => Self::UpdateTask,
            Intent::SetDependency { .. } => Self::SetDependency,
            Intent::RemoveDependency { .. } => Self::RemoveDependency,
            Intent::CompleteTask { .. } => Self::CompleteTask,
            Intent::DeleteTask { .. } => Self::DeleteTask,
            Intent::CreateGroup { .. } => Self::CreateGroup,
            Intent::UpdateGroup { .. } => Self::UpdateGroup,
            Intent::DeleteGroup { .. } => Self::DeleteGroup,
            Intent::AddGroupMember { .. } => Self::AddGroupMember,
            Intent::RemoveGroupMember { .. } => Self::RemoveGroupMember,
        }
    }
}

/// Validation status of a staged operation.
///
/// `Pending` operations passed their staging checks and wait for the
/// authoritative re-validation at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Validation {
    Pending,
    Valid,
    Rejected(String),
}

/// One not-yet-committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedOperation {
    /// Index of the intent that produced this operation
    pub intent_index: usize,
    pub kind: OperationKind,
    /// ID of the affected task or group
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<u32>,
    /// Set on the next occurrence created when a recurring task completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawned_from: Option<String>,
    pub validation: Validation,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Committed {
        session_id: String,
        /// Tasks and groups created, in creation order
        created_ids: Vec<String>,
        updated_ids: Vec<String>,
        deleted_ids: Vec<String>,
        /// Placeholder number to created ID
        placeholders: BTreeMap<u32, String>,
    },
    Aborted {
        session_id: String,
        reason: String,
        /// Stable error code, see [`Error::code`]
        kind: String,
        failing_intent_index: Option<usize>,
    },
}

impl Outcome {
    fn aborted(session_id: &str, error: &Error, failing_intent_index: Option<usize>) -> Self {
        Outcome::Aborted {
            session_id: session_id.to_string(),
            reason: error.to_string(),
            kind: error.code().to_string(),
            failing_intent_index,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed { .. })
    }

    pub fn session_id(&self) -> &str {
        match self {
            Outcome::Committed { session_id, .. } | Outcome::Aborted { session_id, .. } => {
                session_id
            }
        }
    }

    /// ID created for `pending:<n>`, if the batch committed.
    pub fn placeholder(&self, n: u32) -> Option<&str> {
        match self {
            Outcome::Committed { placeholders, .. } => placeholders.get(&n).map(String::as_str),
            Outcome::Aborted { .. } => None,
        }
    }
}

/// Tunables for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub max_intents: usize,
    /// Urgency for `create_task` intents that do not name one
    pub default_urgency: Urgency,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_intents: DEFAULT_MAX_INTENTS,
            default_urgency: Urgency::default(),
        }
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Serialize)]
pub struct SessionSummary<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub state: SessionState,
    pub current_task: Option<&'a str>,
    pub operations: &'a [StagedOperation],
    pub plan: &'a [String],
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'a Outcome>,
}

/// One multi-step command interaction.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: SessionState,
    /// Task that `current` refers to; set while in `EditingTask`
    current_task: Option<String>,
    ctx: Context,
    ws: WorkingSet,
    /// Staged intents with every reference resolved, replayed at commit
    resolved: Vec<Intent>,
    operations: Vec<StagedOperation>,
    plan: Vec<String>,
    options: SessionOptions,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    outcome: Option<Outcome>,
}

impl Session {
    /// Start a session for an authenticated user.
    pub fn new(user_id: impl Into<String>, options: SessionOptions) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        Self {
            ctx: Context::new(id.clone(), user_id.into(), None, options.default_urgency),
            id,
            state: SessionState::AwaitingCommand,
            current_task: None,
            ws: WorkingSet::new(),
            resolved: Vec::new(),
            operations: Vec::new(),
            plan: Vec::new(),
            options,
            created_at: now,
            last_activity: now,
            outcome: None,
        }
    }

    /// Use a fixed session ID. Created IDs derive from it, so the same ID and
    /// intents over the same state produce the same outcome.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self.ctx.session_id = self.id.clone();
        self
    }

    /// Use a fixed date as "today" for recurrence instead of the date each
    /// completion is staged on.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.ctx.today = Some(today);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.ctx.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    pub fn operations(&self) -> &[StagedOperation] {
        &self.operations
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn summary(&self) -> SessionSummary<'_> {
        SessionSummary {
            id: &self.id,
            user_id: &self.ctx.user_id,
            state: self.state,
            current_task: self.current_task.as_deref(),
            operations: &self.operations,
            plan: &self.plan,
            created_at: self.created_at,
            last_activity: self.last_activity,
            outcome: self.outcome.as_ref(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Completed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    fn sync_state(&mut self) {
        self.state = if self.current_task.is_some() {
            SessionState::EditingTask
        } else {
            SessionState::AwaitingCommand
        };
    }

    /// End the session with a failure. Returns the error for propagation.
    fn fail(&mut self, error: Error, index: Option<usize>) -> Error {
        tracing::info!(
            session = %self.id,
            user = %self.ctx.user_id,
            index = ?index,
            code = error.code(),
            "batch aborted: {error}"
        );
        self.state = SessionState::Completed;
        self.ws = WorkingSet::new();
        self.outcome = Some(Outcome::aborted(&self.id, &error, index));
        error
    }

    /// Stage the next intent of the batch.
    ///
    /// On failure the session is completed and the error returned; nothing
    /// staged so far will ever be written.
    pub fn stage<R: Reader + ?Sized>(&mut self, base: &R, intent: Intent) -> Result<()> {
        self.ensure_open()?;
        self.touch();

        let index = self.resolved.len();
        if index >= self.options.max_intents {
            let error = Error::InvalidInput(format!(
                "batch exceeds the limit of {} intents",
                self.options.max_intents
            ));
            return Err(self.fail(error, Some(index)));
        }

        tracing::debug!(session = %self.id, index, op = intent.op(), "staging intent");
        let staged =
            Stager::new(base, &mut self.ws, &mut self.ctx, &mut self.current_task).stage(index, &intent);

        match staged {
            Ok(staged) => {
                self.resolved.push(staged.resolved);
                self.operations.extend(staged.operations);
                self.sync_state();
                Ok(())
            }
            Err(error) => {
                self.operations.push(StagedOperation {
                    intent_index: index,
                    kind: OperationKind::of(&intent),
                    target: intent_target(&intent),
                    placeholder: None,
                    spawned_from: None,
                    validation: Validation::Rejected(error.to_string()),
                });
                Err(self.fail(error, Some(index)))
            }
        }
    }

    /// Make `task` the current task. Requires read access.
    ///
    /// A failed selection leaves the session open.
    pub fn select<R: Reader + ?Sized>(&mut self, base: &R, task: &TaskRef) -> Result<Task> {
        self.ensure_open()?;
        self.touch();
        let selected = Stager::new(base, &mut self.ws, &mut self.ctx, &mut self.current_task).select(task)?;
        self.sync_state();
        Ok(selected)
    }

    /// Leave the current task; `current` stops resolving.
    pub fn exit_editing(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.touch();
        self.current_task = None;
        self.sync_state();
        Ok(())
    }

    /// Record a free-text plan note in the session summary.
    pub fn record_plan(&mut self, note: &str) -> Result<()> {
        self.ensure_open()?;
        self.touch();
        let note = note.trim();
        if note.is_empty() {
            return Err(Error::InvalidInput("plan note must not be empty".to_string()));
        }
        self.plan.push(note.to_string());
        Ok(())
    }

    /// Drop everything staged and close the session.
    pub fn discard(&mut self) -> Result<Outcome> {
        self.ensure_open()?;
        tracing::info!(session = %self.id, staged = self.resolved.len(), "batch discarded");
        self.state = SessionState::Completed;
        self.ws = WorkingSet::new();
        let outcome = Outcome::Aborted {
            session_id: self.id.clone(),
            reason: "discarded".to_string(),
            kind: "discarded".to_string(),
            failing_intent_index: None,
        };
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Re-validate and write every staged operation as one transaction.
    ///
    /// Validation and storage failures end the session with an
    /// [`Outcome::Aborted`]; only misuse of a closed session is an `Err`.
    pub fn commit<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<Outcome> {
        self.ensure_open()?;
        self.touch();

        let changes = self.ws.changes();
        let failing_index = Cell::new(None);

        if !changes.is_empty() {
            let replay = |reader: &dyn Reader| -> Result<()> {
                let mut ws = WorkingSet::new();
                let mut ctx = self.ctx.fresh();
                let mut current = None;
                for (index, intent) in self.resolved.iter().enumerate() {
                    Stager::new(reader, &mut ws, &mut ctx, &mut current)
                        .stage(index, intent)
                        .map_err(|e| {
                            failing_index.set(Some(index));
                            Error::Conflict(format!(
                                "intent {index} ({}) no longer holds: {e}",
                                intent.op()
                            ))
                        })?;
                }
                Ok(())
            };

            if let Err(error) = store.apply(&changes, &replay) {
                let error = match error {
                    Error::Conflict(_) => error,
                    other => Error::Conflict(other.to_string()),
                };
                let index = failing_index.get();
                if let Some(index) = index {
                    for operation in self.operations.iter_mut().filter(|o| o.intent_index == index) {
                        operation.validation = Validation::Rejected(error.to_string());
                    }
                }
                self.fail(error, index);
                return Ok(self.aborted_outcome());
            }
        }

        for operation in &mut self.operations {
            operation.validation = Validation::Valid;
        }

        let created: Vec<&str> = changes
            .created_groups
            .iter()
            .map(|g| g.id.as_str())
            .chain(changes.created_tasks.iter().map(|t| t.id.as_str()))
            .collect();
        let placeholders: BTreeMap<u32, String> = self
            .ctx
            .placeholders
            .iter()
            .filter(|(_, p)| created.contains(&p.id()))
            .map(|(n, p)| (*n, p.id().to_string()))
            .collect();

        let outcome = Outcome::Committed {
            session_id: self.id.clone(),
            created_ids: placeholders.values().cloned().collect(),
            updated_ids: changes
                .updated_groups
                .iter()
                .map(|g| g.entity.id.clone())
                .chain(changes.updated_tasks.iter().map(|t| t.entity.id.clone()))
                .collect(),
            deleted_ids: changes
                .deleted_groups
                .iter()
                .chain(changes.deleted_tasks.iter())
                .map(|d| d.entity.clone())
                .collect(),
            placeholders,
        };

        tracing::info!(
            session = %self.id,
            user = %self.ctx.user_id,
            intents = self.resolved.len(),
            created = changes.created_groups.len() + changes.created_tasks.len(),
            updated = changes.updated_groups.len() + changes.updated_tasks.len(),
            deleted = changes.deleted_groups.len() + changes.deleted_tasks.len(),
            "batch committed"
        );

        self.state = SessionState::Completed;
        self.ws = WorkingSet::new();
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn aborted_outcome(&self) -> Outcome {
        self.outcome.clone().unwrap_or_else(|| Outcome::Aborted {
            session_id: self.id.clone(),
            reason: "aborted".to_string(),
            kind: "other".to_string(),
            failing_intent_index: None,
        })
    }

    /// Stage every intent in order, then commit.
    ///
    /// Oversized batches are rejected before anything is staged.
    pub fn run<S: Store + ?Sized>(&mut self, store: &mut S, intents: Vec<Intent>) -> Result<Outcome> {
        self.ensure_open()?;
        if intents.len() > self.options.max_intents {
            let error = Error::InvalidInput(format!(
                "batch of {} intents exceeds the limit of {}",
                intents.len(),
                self.options.max_intents
            ));
            self.fail(error, None);
            return Ok(self.aborted_outcome());
        }

        for intent in intents {
            if let Err(error) = self.stage(&*store, intent) {
                return match error {
                    Error::SessionClosed => Err(error),
                    _ => Ok(self.aborted_outcome()),
                };
            }
        }
        self.commit(store)
    }
}

/// Best-effort description of what a rejected intent pointed at.
fn intent_target(intent: &Intent) -> String {
    match intent {
        Intent::CreateTask { title, .. } => title.clone(),
        Intent::UpdateTask { task, .. }
        | Intent::SetDependency { task, .. }
        | Intent::RemoveDependency { task, .. }
        | Intent::CompleteTask { task }
        | Intent::DeleteTask { task } => task.to_string(),
        Intent::CreateGroup { name, .. } => name.clone(),
        Intent::UpdateGroup { group, .. }
        | Intent::DeleteGroup { group }
        | Intent::AddGroupMember { group, .. }
        | Intent::RemoveGroupMember { group, .. } => group.to_string(),
    }
}
