//! Storage layer for SmartTodo data.
//!
//! This module is the transactional record store the staged command state
//! machine commits into. It exposes two traits:
//!
//! - [`Reader`] - point lookups of users, groups and tasks. Implemented by the
//!   store itself, by a view over an open transaction, and by the session's
//!   in-memory working set, so authorization and graph checks are written once.
//! - [`Store`] - a reader that can apply a [`ChangeSet`] as one unit.
//!
//! [`SqliteStore`] implements both on top of a single SQLite database.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};

use crate::models::{Group, Recurrence, Task, TaskStatus, Urgency, User, generate_id};
use crate::{Error, Result};

/// Point lookups over some view of the persisted state.
pub trait Reader {
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    fn get_group(&self, id: &str) -> Result<Option<Group>>;

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>>;

    fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// Groups the user is a direct member of, sorted by ID.
    fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// Tasks that list `task_id` as a prerequisite, sorted by ID.
    fn dependent_ids(&self, task_id: &str) -> Result<Vec<String>>;
}

/// A persisted entity together with the revision it was staged against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revisioned<T> {
    pub entity: T,
    pub expected_revision: i64,
}

/// Every write produced by one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub created_groups: Vec<Group>,
    pub updated_groups: Vec<Revisioned<Group>>,
    pub created_tasks: Vec<Task>,
    pub updated_tasks: Vec<Revisioned<Task>>,
    pub deleted_tasks: Vec<Revisioned<String>>,
    pub deleted_groups: Vec<Revisioned<String>>,
    /// (group ID, user ID) pairs
    pub added_memberships: Vec<(String, String)>,
    pub removed_memberships: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created_groups.is_empty()
            && self.updated_groups.is_empty()
            && self.created_tasks.is_empty()
            && self.updated_tasks.is_empty()
            && self.deleted_tasks.is_empty()
            && self.deleted_groups.is_empty()
            && self.added_memberships.is_empty()
            && self.removed_memberships.is_empty()
    }
}

/// Callback run inside the commit transaction, before any write.
pub type Revalidate<'a> = dyn Fn(&dyn Reader) -> Result<()> + 'a;

/// A record store that can apply a whole batch atomically.
pub trait Store: Reader {
    /// Apply `changes` as one transaction.
    ///
    /// `revalidate` sees the state inside the transaction and may veto the
    /// commit. Any failure leaves the persisted state untouched. Failures of
    /// the underlying store are reported as [`Error::Conflict`].
    fn apply(&mut self, changes: &ChangeSet, revalidate: &Revalidate<'_>) -> Result<()>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    credential_hash TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_groups (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    parent_id   TEXT REFERENCES user_groups(id) ON DELETE SET NULL,
    created_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    revision    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    CHECK (parent_id IS NULL OR parent_id != id)
);

CREATE TABLE IF NOT EXISTS group_memberships (
    group_id TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    description  TEXT,
    status       TEXT NOT NULL DEFAULT 'todo'
                 CHECK (status IN ('todo', 'in_progress', 'completed')),
    urgency      TEXT NOT NULL DEFAULT 'normal',
    due_date     TEXT,
    recurrence   TEXT NOT NULL DEFAULT 'none',
    owner_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    revision     INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS task_assignee_users (
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, user_id)
);

CREATE TABLE IF NOT EXISTS task_assignee_groups (
    task_id  TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    group_id TEXT NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, group_id)
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    task_id         TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    prerequisite_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    PRIMARY KEY (task_id, prerequisite_id),
    CHECK (task_id != prerequisite_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_user ON group_memberships(user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_assignee_users_user ON task_assignee_users(user_id);
CREATE INDEX IF NOT EXISTS idx_assignee_groups_group ON task_assignee_groups(group_id);
CREATE INDEX IF NOT EXISTS idx_dependencies_prerequisite ON task_dependencies(prerequisite_id);
"#;

/// SQLite-backed store.
pub struct SqliteStore {
    /// Database file, or `None` for an in-memory database
    path: Option<PathBuf>,
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::set_pragmas(&conn, true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn,
        })
    }

    /// Open an existing database, failing if it has not been initialized.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotInitialized);
        }
        Self::open(path)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::set_pragmas(&conn, false)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path: None, conn })
    }

    fn set_pragmas(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            // journal_mode returns a row, so it cannot go through execute_batch
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        }
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn reader(&self) -> ConnReader<'_> {
        ConnReader(&self.conn)
    }

    // === Direct operations (outside staged batches) ===

    /// Register a user handed over by the credential layer.
    pub fn create_user(&mut self, name: &str, credential_hash: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("user name must not be empty".to_string()));
        }
        if self.find_user_by_name(name)?.is_some() {
            return Err(Error::Conflict(format!("user '{name}' already exists")));
        }

        let now = Utc::now();
        let seed = format!("{}:{}", name, now.timestamp_nanos_opt().unwrap_or(0));
        let user = User {
            id: generate_id("us", &seed),
            name: name.to_string(),
            credential_hash: credential_hash.to_string(),
            created_at: now,
        };
        self.conn.execute(
            "INSERT INTO users (id, name, credential_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.credential_hash, user.created_at.to_rfc3339()],
        )?;
        Ok(user)
    }

    pub fn find_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let id: Option<String> = self
            .conn
            .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, credential_hash, created_at FROM users ORDER BY name")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let mut stmt = self.conn.prepare("SELECT id FROM user_groups ORDER BY name")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = self.get_group(&id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Direct user members of a group, sorted by ID.
    pub fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT user_id FROM group_memberships WHERE group_id = ?1 ORDER BY user_id",
        )?;
        let ids = stmt
            .query_map([group_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// All tasks, most urgent first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare("SELECT id FROM tasks ORDER BY created_at, id")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.get_task(&id)? {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| b.urgency.cmp(&a.urgency));
        Ok(tasks)
    }

    /// Insert a group outside of any batch.
    pub fn insert_group(&mut self, group: &Group) -> Result<()> {
        insert_group(&self.conn, group)
    }

    /// Insert a task outside of any batch.
    pub fn insert_task(&mut self, task: &Task) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_task(&tx, task)?;
        tx.commit()?;
        Ok(())
    }

    /// Add a user to a group outside of any batch.
    pub fn insert_membership(&mut self, group_id: &str, user_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO group_memberships (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, user_id],
        )?;
        Ok(())
    }
}

impl Reader for SqliteStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.reader().get_user(id)
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        self.reader().get_group(id)
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        self.reader().find_group_by_name(name)
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.reader().get_task(id)
    }

    fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.reader().user_group_ids(user_id)
    }

    fn dependent_ids(&self, task_id: &str) -> Result<Vec<String>> {
        self.reader().dependent_ids(task_id)
    }
}

impl Store for SqliteStore {
    fn apply(&mut self, changes: &ChangeSet, revalidate: &Revalidate<'_>) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_conflict)?;
        // Rows inside one batch may reference each other in any order.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")
            .map_err(storage_conflict)?;

        revalidate(&ConnReader(&tx))?;
        write_changes(&tx, changes)?;

        tx.commit().map_err(storage_conflict)?;
        Ok(())
    }
}

fn storage_conflict(e: rusqlite::Error) -> Error {
    Error::Conflict(format!("storage rejected the commit: {e}"))
}

fn write_changes(conn: &Connection, changes: &ChangeSet) -> Result<()> {
    // Group deletions and renames run before inserts so freed names can be
    // reused. Deleting a group cascades to its assignments and memberships.
    for deletion in &changes.deleted_groups {
        let changed = conn
            .execute(
                "DELETE FROM user_groups WHERE id = ?1 AND revision = ?2",
                params![deletion.entity, deletion.expected_revision],
            )
            .map_err(storage_conflict)?;
        if changed == 0 {
            return Err(Error::Conflict(format!(
                "group {} changed since it was staged",
                deletion.entity
            )));
        }
    }

    for update in &changes.updated_groups {
        let group = &update.entity;
        let changed = conn
            .execute(
                "UPDATE user_groups
                 SET name = ?1, description = ?2, parent_id = ?3, updated_at = ?4,
                     revision = revision + 1
                 WHERE id = ?5 AND revision = ?6",
                params![
                    group.name,
                    group.description,
                    group.parent,
                    group.updated_at.to_rfc3339(),
                    group.id,
                    update.expected_revision
                ],
            )
            .map_err(storage_conflict)?;
        if changed == 0 {
            return Err(Error::Conflict(format!(
                "group {} changed since it was staged",
                group.id
            )));
        }
    }

    for group in &changes.created_groups {
        insert_group(conn, group).map_err(into_conflict)?;
    }

    for task in &changes.created_tasks {
        insert_task(conn, task).map_err(into_conflict)?;
    }
    for update in &changes.updated_tasks {
        let task = &update.entity;
        let changed = conn
            .execute(
                "UPDATE tasks
                 SET title = ?1, description = ?2, status = ?3, urgency = ?4, due_date = ?5,
                     recurrence = ?6, updated_at = ?7, completed_at = ?8,
                     revision = revision + 1
                 WHERE id = ?9 AND revision = ?10",
                params![
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.urgency.as_str(),
                    task.due_date.map(|d| d.to_string()),
                    task.recurrence.as_str(),
                    task.updated_at.to_rfc3339(),
                    task.completed_at.map(|t| t.to_rfc3339()),
                    task.id,
                    update.expected_revision
                ],
            )
            .map_err(storage_conflict)?;
        if changed == 0 {
            return Err(Error::Conflict(format!(
                "task {} changed since it was staged",
                task.id
            )));
        }
        replace_task_links(conn, task).map_err(into_conflict)?;
    }
    for deletion in &changes.deleted_tasks {
        let changed = conn
            .execute(
                "DELETE FROM tasks WHERE id = ?1 AND revision = ?2",
                params![deletion.entity, deletion.expected_revision],
            )
            .map_err(storage_conflict)?;
        if changed == 0 {
            return Err(Error::Conflict(format!(
                "task {} changed since it was staged",
                deletion.entity
            )));
        }
    }

    for (group_id, user_id) in &changes.removed_memberships {
        conn.execute(
            "DELETE FROM group_memberships WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )
        .map_err(storage_conflict)?;
    }
    for (group_id, user_id) in &changes.added_memberships {
        conn.execute(
            "INSERT OR IGNORE INTO group_memberships (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, user_id],
        )
        .map_err(storage_conflict)?;
    }

    Ok(())
}

fn into_conflict(e: Error) -> Error {
    match e {
        Error::Database(e) => storage_conflict(e),
        other => other,
    }
}

fn insert_group(conn: &Connection, group: &Group) -> Result<()> {
    conn.execute(
        "INSERT INTO user_groups
         (id, name, description, parent_id, created_by, revision, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            group.id,
            group.name,
            group.description,
            group.parent,
            group.created_by,
            group.revision,
            group.created_at.to_rfc3339(),
            group.updated_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks
         (id, title, description, status, urgency, due_date, recurrence, owner_id,
          revision, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.urgency.as_str(),
            task.due_date.map(|d| d.to_string()),
            task.recurrence.as_str(),
            task.owner,
            task.revision,
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
            task.completed_at.map(|t| t.to_rfc3339())
        ],
    )?;
    replace_task_links(conn, task)
}

/// Rewrite the assignee and prerequisite rows of a task.
fn replace_task_links(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute("DELETE FROM task_assignee_users WHERE task_id = ?1", [&task.id])?;
    conn.execute("DELETE FROM task_assignee_groups WHERE task_id = ?1", [&task.id])?;
    conn.execute("DELETE FROM task_dependencies WHERE task_id = ?1", [&task.id])?;

    for user_id in &task.assignee_users {
        conn.execute(
            "INSERT INTO task_assignee_users (task_id, user_id) VALUES (?1, ?2)",
            params![task.id, user_id],
        )?;
    }
    for group_id in &task.assignee_groups {
        conn.execute(
            "INSERT INTO task_assignee_groups (task_id, group_id) VALUES (?1, ?2)",
            params![task.id, group_id],
        )?;
    }
    for (position, prerequisite) in task.prerequisites.iter().enumerate() {
        conn.execute(
            "INSERT INTO task_dependencies (task_id, prerequisite_id, position)
             VALUES (?1, ?2, ?3)",
            params![task.id, prerequisite, position as i64],
        )?;
    }
    Ok(())
}

/// [`Reader`] over any connection, including an open transaction.
pub struct ConnReader<'c>(pub &'c Connection);

impl ConnReader<'_> {
    fn id_list(&self, sql: &str, key: &str) -> Result<Vec<String>> {
        let mut stmt = self.0.prepare_cached(sql)?;
        let ids = stmt
            .query_map([key], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}

impl Reader for ConnReader<'_> {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user = self
            .0
            .query_row(
                "SELECT id, name, credential_hash, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let group = self
            .0
            .query_row(
                "SELECT id, name, description, parent_id, created_by, revision, created_at, updated_at
                 FROM user_groups WHERE id = ?1",
                [id],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let group = self
            .0
            .query_row(
                "SELECT id, name, description, parent_id, created_by, revision, created_at, updated_at
                 FROM user_groups WHERE name = ?1",
                [name],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .0
            .query_row(
                "SELECT id, title, description, status, urgency, due_date, recurrence, owner_id,
                        revision, created_at, updated_at, completed_at
                 FROM tasks WHERE id = ?1",
                [id],
                task_from_row,
            )
            .optional()?;

        let Some(mut task) = task else {
            return Ok(None);
        };
        task.assignee_users = self.id_list(
            "SELECT user_id FROM task_assignee_users WHERE task_id = ?1 ORDER BY user_id",
            id,
        )?;
        task.assignee_groups = self.id_list(
            "SELECT group_id FROM task_assignee_groups WHERE task_id = ?1 ORDER BY group_id",
            id,
        )?;
        task.prerequisites = self.id_list(
            "SELECT prerequisite_id FROM task_dependencies WHERE task_id = ?1 ORDER BY position",
            id,
        )?;
        Ok(Some(task))
    }

    fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.id_list(
            "SELECT group_id FROM group_memberships WHERE user_id = ?1 ORDER BY group_id",
            user_id,
        )
    }

    fn dependent_ids(&self, task_id: &str) -> Result<Vec<String>> {
        self.id_list(
            "SELECT task_id FROM task_dependencies WHERE prerequisite_id = ?1 ORDER BY task_id",
            task_id,
        )
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        credential_hash: row.get(2)?,
        created_at: timestamp(row, 3)?,
    })
}

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent: row.get(3)?,
        created_by: row.get(4)?,
        revision: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let urgency: String = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;
    let recurrence: String = row.get(6)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: TaskStatus::parse(&status).map_err(|e| conversion_error(3, e))?,
        urgency: Urgency::parse(&urgency).map_err(|e| conversion_error(4, e))?,
        due_date: due_date
            .map(|d| d.parse::<NaiveDate>().map_err(|e| conversion_error(5, e)))
            .transpose()?,
        recurrence: Recurrence::parse(&recurrence).map_err(|e| conversion_error(6, e))?,
        owner: row.get(7)?,
        assignee_users: Vec::new(),
        assignee_groups: Vec::new(),
        prerequisites: Vec::new(),
        revision: row.get(8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
        completed_at: optional_timestamp(row, 11)?,
    })
}
