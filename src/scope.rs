//! Scope resolution: which groups a user belongs to and which tasks they may touch.
//!
//! Membership is inherited upward: a member of a group is also a member of
//! every ancestor reached through the `parent` links. All checks run against a
//! [`Reader`], so the same code answers for persisted state and for a batch
//! that is still being staged.

use std::collections::BTreeSet;

use crate::models::graph::walk_chain;
use crate::models::{Group, Task};
use crate::storage::Reader;
use crate::{Error, Result};

/// What a user wants to do with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Complete,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Complete => "complete",
            Action::Delete => "delete",
        }
    }
}

/// Every group a user belongs to, directly or through nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupClosure {
    pub groups: BTreeSet<String>,

    /// First group found whose ancestry loops back on itself
    pub cycle_at: Option<String>,
}

impl GroupClosure {
    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.contains(group_id)
    }
}

/// Compute the reflexive-transitive closure of a user's group memberships.
///
/// Terminates on malformed data: a parent chain that loops back is cut at
/// the repeated group and reported through [`GroupClosure::cycle_at`].
pub fn resolve_groups<R: Reader + ?Sized>(reader: &R, user_id: &str) -> Result<GroupClosure> {
    let mut closure = GroupClosure::default();

    for direct in reader.user_group_ids(user_id)? {
        if closure.groups.contains(&direct) {
            continue;
        }

        let chain = walk_chain(&direct, |id| {
            Ok(reader.get_group(id)?.and_then(|group| group.parent))
        })?;

        if let Some(at) = &chain.cycle_at {
            tracing::warn!(group = %at, user = %user_id, "group ancestry contains a cycle");
            closure.cycle_at.get_or_insert_with(|| at.clone());
        }

        closure.groups.extend(chain.nodes);
    }

    Ok(closure)
}

/// Decide whether `user_id` may perform `action` on `task`.
///
/// Every action uses the same rule: the user owns the task, is a direct
/// assignee, or belongs to an assigned group.
pub fn authorize<R: Reader + ?Sized>(
    reader: &R,
    user_id: &str,
    task: &Task,
    action: Action,
) -> Result<bool> {
    if task.owner == user_id || task.assignee_users.iter().any(|u| u == user_id) {
        return Ok(true);
    }
    if task.assignee_groups.is_empty() {
        return Ok(false);
    }

    let closure = resolve_groups(reader, user_id)?;
    let allowed = task.assignee_groups.iter().any(|g| closure.contains(g));
    tracing::trace!(task = %task.id, user = %user_id, action = action.as_str(), allowed, "group scope check");
    Ok(allowed)
}

/// Like [`authorize`], but fails with [`Error::Unauthorized`].
pub fn require<R: Reader + ?Sized>(
    reader: &R,
    user_id: &str,
    task: &Task,
    action: Action,
) -> Result<()> {
    if authorize(reader, user_id, task, action)? {
        Ok(())
    } else {
        Err(Error::Unauthorized(format!(
            "user {} may not {} task {}",
            user_id,
            action.as_str(),
            task.id
        )))
    }
}

/// Only the creator of a group may modify it.
pub fn can_modify_group(user_id: &str, group: &Group) -> bool {
    group.created_by == user_id
}

pub fn require_group_owner(user_id: &str, group: &Group) -> Result<()> {
    if can_modify_group(user_id, group) {
        Ok(())
    } else {
        Err(Error::Unauthorized(format!(
            "user {} may not modify group {} (created by {})",
            user_id, group.id, group.created_by
        )))
    }
}

/// Would making `proposed_parent` the parent of `group_id` close a cycle?
///
/// Walks upward from the proposed parent; meeting `group_id` on the way
/// means the group would become its own ancestor.
pub fn would_create_group_cycle<R: Reader + ?Sized>(
    reader: &R,
    group_id: &str,
    proposed_parent: &str,
) -> Result<bool> {
    if group_id == proposed_parent {
        return Ok(true);
    }
    let chain = walk_chain(proposed_parent, |id| {
        Ok(reader.get_group(id)?.and_then(|group| group.parent))
    })?;
    Ok(chain.nodes.iter().any(|id| id == group_id))
}

/// Fail with [`Error::Cycle`] if the parent link would close a cycle.
pub fn check_group_parent<R: Reader + ?Sized>(
    reader: &R,
    group_id: &str,
    proposed_parent: &str,
) -> Result<()> {
    if would_create_group_cycle(reader, group_id, proposed_parent)? {
        return Err(Error::Cycle(format!(
            "group {} cannot be nested under {}: it would become its own ancestor",
            group_id, proposed_parent
        )));
    }
    Ok(())
}
