//! In-memory overlay of staged writes over a persisted [`Reader`].
//!
//! A [`WorkingSet`] only records what a batch has touched. Reads go through a
//! [`View`], which answers from the overlay first and falls back to the base
//! reader, so checks run mid-batch see tasks and groups created or changed by
//! earlier intents.

use std::collections::HashMap;

use crate::Result;
use crate::models::{Group, Task, User};
use crate::storage::{ChangeSet, Reader, Revisioned};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Created,
    Loaded { revision: i64 },
}

#[derive(Debug, Clone)]
struct Slot<T> {
    origin: Origin,
    /// `None` once deleted
    current: Option<T>,
}

/// Staged entity states for one batch.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    tasks: HashMap<String, Slot<Task>>,
    task_order: Vec<String>,
    groups: HashMap<String, Slot<Group>>,
    group_order: Vec<String>,
    /// (group ID, user ID)
    memberships: Vec<(String, String)>,
    removed_memberships: Vec<(String, String)>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.groups.is_empty()
            && self.memberships.is_empty()
            && self.removed_memberships.is_empty()
    }

    /// Layer this working set over `base`.
    pub fn view<'a, R: Reader + ?Sized>(&'a self, base: &'a R) -> View<'a, R> {
        View { base, ws: self }
    }

    fn is_deleted(&self, task_id: &str) -> bool {
        matches!(self.tasks.get(task_id), Some(slot) if slot.current.is_none())
    }

    fn is_group_deleted(&self, group_id: &str) -> bool {
        matches!(self.groups.get(group_id), Some(slot) if slot.current.is_none())
    }

    /// Drop prerequisite edges and group assignments that point at entities
    /// deleted in this batch.
    fn without_deleted(&self, mut task: Task) -> Task {
        task.prerequisites.retain(|p| !self.is_deleted(p));
        task.assignee_groups.retain(|g| !self.is_group_deleted(g));
        task
    }

    /// Detach a group whose parent is deleted in this batch.
    fn detach_deleted(&self, mut group: Group) -> Group {
        if group.parent.as_deref().is_some_and(|p| self.is_group_deleted(p)) {
            group.parent = None;
        }
        group
    }

    pub fn create_task(&mut self, task: Task) {
        self.task_order.push(task.id.clone());
        self.tasks.insert(
            task.id.clone(),
            Slot {
                origin: Origin::Created,
                current: Some(task),
            },
        );
    }

    /// Stage a new state for a task read through a [`View`].
    pub fn put_task(&mut self, task: Task) {
        match self.tasks.get_mut(&task.id) {
            Some(slot) => slot.current = Some(task),
            None => {
                self.task_order.push(task.id.clone());
                self.tasks.insert(
                    task.id.clone(),
                    Slot {
                        origin: Origin::Loaded {
                            revision: task.revision,
                        },
                        current: Some(task),
                    },
                );
            }
        }
    }

    pub fn delete_task(&mut self, task: &Task) {
        match self.tasks.get_mut(&task.id) {
            Some(slot) => slot.current = None,
            None => {
                self.task_order.push(task.id.clone());
                self.tasks.insert(
                    task.id.clone(),
                    Slot {
                        origin: Origin::Loaded {
                            revision: task.revision,
                        },
                        current: None,
                    },
                );
            }
        }
    }

    pub fn create_group(&mut self, group: Group) {
        self.group_order.push(group.id.clone());
        self.groups.insert(
            group.id.clone(),
            Slot {
                origin: Origin::Created,
                current: Some(group),
            },
        );
    }

    /// Stage a new state for a group read through a [`View`].
    pub fn put_group(&mut self, group: Group) {
        match self.groups.get_mut(&group.id) {
            Some(slot) => slot.current = Some(group),
            None => {
                self.group_order.push(group.id.clone());
                self.groups.insert(
                    group.id.clone(),
                    Slot {
                        origin: Origin::Loaded {
                            revision: group.revision,
                        },
                        current: Some(group),
                    },
                );
            }
        }
    }

    pub fn delete_group(&mut self, group: &Group) {
        match self.groups.get_mut(&group.id) {
            Some(slot) => slot.current = None,
            None => {
                self.group_order.push(group.id.clone());
                self.groups.insert(
                    group.id.clone(),
                    Slot {
                        origin: Origin::Loaded {
                            revision: group.revision,
                        },
                        current: None,
                    },
                );
            }
        }
    }

    pub fn add_membership(&mut self, group_id: &str, user_id: &str) {
        let pair = (group_id.to_string(), user_id.to_string());
        self.removed_memberships.retain(|p| p != &pair);
        if !self.memberships.contains(&pair) {
            self.memberships.push(pair);
        }
    }

    pub fn remove_membership(&mut self, group_id: &str, user_id: &str) {
        let pair = (group_id.to_string(), user_id.to_string());
        self.memberships.retain(|p| p != &pair);
        if !self.removed_memberships.contains(&pair) {
            self.removed_memberships.push(pair);
        }
    }

    /// Everything this batch would write, in staging order.
    pub fn changes(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for id in &self.group_order {
            let Some(slot) = self.groups.get(id) else {
                continue;
            };
            match (slot.origin, &slot.current) {
                (Origin::Created, Some(group)) => {
                    changes.created_groups.push(self.detach_deleted(group.clone()))
                }
                (Origin::Created, None) => {}
                (Origin::Loaded { revision }, Some(group)) => {
                    changes.updated_groups.push(Revisioned {
                        entity: self.detach_deleted(group.clone()),
                        expected_revision: revision,
                    })
                }
                (Origin::Loaded { revision }, None) => changes.deleted_groups.push(Revisioned {
                    entity: id.clone(),
                    expected_revision: revision,
                }),
            }
        }

        for id in &self.task_order {
            let Some(slot) = self.tasks.get(id) else {
                continue;
            };
            match (slot.origin, &slot.current) {
                (Origin::Created, Some(task)) => {
                    changes.created_tasks.push(self.without_deleted(task.clone()))
                }
                (Origin::Created, None) => {}
                (Origin::Loaded { revision }, Some(task)) => {
                    changes.updated_tasks.push(Revisioned {
                        entity: self.without_deleted(task.clone()),
                        expected_revision: revision,
                    })
                }
                (Origin::Loaded { revision }, None) => changes.deleted_tasks.push(Revisioned {
                    entity: id.clone(),
                    expected_revision: revision,
                }),
            }
        }

        let live = |(group, _): &&(String, String)| !self.is_group_deleted(group);
        changes.added_memberships = self.memberships.iter().filter(live).cloned().collect();
        changes.removed_memberships = self.removed_memberships.iter().filter(live).cloned().collect();
        changes
    }
}

/// A [`WorkingSet`] layered over a base reader.
pub struct View<'a, R: ?Sized> {
    base: &'a R,
    ws: &'a WorkingSet,
}

impl<R: Reader + ?Sized> Reader for View<'_, R> {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.base.get_user(id)
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let group = match self.ws.groups.get(id) {
            Some(slot) => slot.current.clone(),
            None => self.base.get_group(id)?,
        };
        Ok(group.map(|g| self.ws.detach_deleted(g)))
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let staged = self
            .ws
            .group_order
            .iter()
            .filter_map(|id| self.ws.groups.get(id))
            .filter_map(|slot| slot.current.as_ref())
            .find(|group| group.name == name);
        if let Some(group) = staged {
            return Ok(Some(self.ws.detach_deleted(group.clone())));
        }
        // The persisted holder of the name may have been renamed or deleted
        match self.base.find_group_by_name(name)? {
            Some(group) => Ok(self.get_group(&group.id)?.filter(|g| g.name == name)),
            None => Ok(None),
        }
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let task = match self.ws.tasks.get(id) {
            Some(slot) => slot.current.clone(),
            None => self.base.get_task(id)?,
        };
        Ok(task.map(|t| self.ws.without_deleted(t)))
    }

    fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let mut ids = self.base.user_group_ids(user_id)?;
        ids.retain(|group| {
            !self
                .ws
                .removed_memberships
                .iter()
                .any(|(g, u)| g == group && u == user_id)
        });
        ids.extend(
            self.ws
                .memberships
                .iter()
                .filter(|(_, user)| user == user_id)
                .map(|(group, _)| group.clone()),
        );
        ids.retain(|group| !self.ws.is_group_deleted(group));
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn dependent_ids(&self, task_id: &str) -> Result<Vec<String>> {
        // Staged tasks answer for themselves; the base only for untouched ones.
        let mut ids: Vec<String> = self
            .base
            .dependent_ids(task_id)?
            .into_iter()
            .filter(|id| !self.ws.tasks.contains_key(id))
            .collect();
        ids.extend(
            self.ws
                .tasks
                .iter()
                .filter_map(|(id, slot)| slot.current.as_ref().map(|task| (id, task)))
                .filter(|(_, task)| task.prerequisites.iter().any(|p| p == task_id))
                .map(|(id, _)| id.clone()),
        );
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use crate::storage::SqliteStore;
    use crate::test_utils::{seed_group, seed_task, seed_user};

    #[test]
    fn test_view_prefers_staged_state() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let task = seed_task(&mut store, "persisted", &alice.id);

        let mut ws = WorkingSet::new();
        let mut staged = task.clone();
        staged.status = TaskStatus::Completed;
        ws.put_task(staged);

        let view = ws.view(&store);
        assert!(view.get_task(&task.id).unwrap().unwrap().is_completed());
        // The base is untouched
        assert!(!store.get_task(&task.id).unwrap().unwrap().is_completed());
    }

    #[test]
    fn test_deleted_task_hidden_and_edges_dropped() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let prereq = seed_task(&mut store, "prereq", &alice.id);
        let mut dependent = Task::new("tk-0000dead".to_string(), "dep".to_string(), alice.id.clone());
        dependent.prerequisites.push(prereq.id.clone());
        store.insert_task(&dependent).unwrap();

        let mut ws = WorkingSet::new();
        ws.delete_task(&prereq);

        let view = ws.view(&store);
        assert!(view.get_task(&prereq.id).unwrap().is_none());
        assert!(view.get_task("tk-0000dead").unwrap().unwrap().prerequisites.is_empty());

        let changes = ws.changes();
        assert_eq!(changes.deleted_tasks.len(), 1);
        assert_eq!(changes.deleted_tasks[0].entity, prereq.id);
    }

    #[test]
    fn test_created_then_deleted_writes_nothing() {
        let mut ws = WorkingSet::new();
        let task = Task::new("tk-00000001".to_string(), "tmp".to_string(), "us-00000001".to_string());
        ws.create_task(task.clone());
        ws.delete_task(&task);
        assert!(ws.changes().is_empty());
    }

    #[test]
    fn test_changes_carry_loaded_revision() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let group = seed_group(&mut store, "team", None, &alice.id);

        let mut ws = WorkingSet::new();
        let mut first = group.clone();
        first.description = Some("one".to_string());
        ws.put_group(first);
        let mut second = group.clone();
        second.description = Some("two".to_string());
        ws.put_group(second);

        let changes = ws.changes();
        assert_eq!(changes.updated_groups.len(), 1);
        assert_eq!(changes.updated_groups[0].expected_revision, 0);
        assert_eq!(changes.updated_groups[0].entity.description.as_deref(), Some("two"));
    }

    #[test]
    fn test_staged_memberships_visible() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let bob = seed_user(&mut store, "bob");
        let a = seed_group(&mut store, "a", None, &alice.id);
        let b = seed_group(&mut store, "b", None, &alice.id);
        store.insert_membership(&b.id, &bob.id).unwrap();

        let mut ws = WorkingSet::new();
        ws.add_membership(&a.id, &bob.id);
        ws.add_membership(&a.id, &bob.id);

        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(ws.view(&store).user_group_ids(&bob.id).unwrap(), expected);
        assert_eq!(ws.changes().added_memberships.len(), 1);
    }

    #[test]
    fn test_removed_membership_hidden() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let bob = seed_user(&mut store, "bob");
        let a = seed_group(&mut store, "a", None, &alice.id);
        store.insert_membership(&a.id, &bob.id).unwrap();

        let mut ws = WorkingSet::new();
        ws.remove_membership(&a.id, &bob.id);
        assert!(ws.view(&store).user_group_ids(&bob.id).unwrap().is_empty());

        let changes = ws.changes();
        assert_eq!(changes.removed_memberships, vec![(a.id.clone(), bob.id.clone())]);
        assert!(changes.added_memberships.is_empty());

        // Adding back in the same batch cancels the removal
        ws.add_membership(&a.id, &bob.id);
        assert!(ws.changes().removed_memberships.is_empty());
        assert_eq!(ws.view(&store).user_group_ids(&bob.id).unwrap(), vec![a.id]);
    }

    #[test]
    fn test_dependents_include_staged_edges() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let base = seed_task(&mut store, "base", &alice.id);
        let mut persisted = Task::new("tk-0000000a".to_string(), "a".to_string(), alice.id.clone());
        persisted.prerequisites.push(base.id.clone());
        store.insert_task(&persisted).unwrap();

        let mut ws = WorkingSet::new();
        let mut staged = Task::new("tk-0000000b".to_string(), "b".to_string(), alice.id.clone());
        staged.prerequisites.push(base.id.clone());
        ws.create_task(staged);
        assert_eq!(
            ws.view(&store).dependent_ids(&base.id).unwrap(),
            vec!["tk-0000000a".to_string(), "tk-0000000b".to_string()]
        );

        // Dropping the persisted edge in the batch hides it
        let mut unlinked = store.get_task("tk-0000000a").unwrap().unwrap();
        unlinked.prerequisites.clear();
        ws.put_task(unlinked);
        assert_eq!(
            ws.view(&store).dependent_ids(&base.id).unwrap(),
            vec!["tk-0000000b".to_string()]
        );
    }

    #[test]
    fn test_deleted_group_hidden_everywhere() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let outer = seed_group(&mut store, "outer", None, &alice.id);
        let inner = seed_group(&mut store, "inner", Some(&outer.id), &alice.id);
        store.insert_membership(&outer.id, &alice.id).unwrap();
        let mut task = Task::new("tk-00000010".to_string(), "t".to_string(), alice.id.clone());
        task.assignee_groups = vec![outer.id.clone()];
        store.insert_task(&task).unwrap();

        let mut ws = WorkingSet::new();
        ws.delete_group(&outer);
        ws.add_membership(&outer.id, &alice.id);

        let view = ws.view(&store);
        assert!(view.get_group(&outer.id).unwrap().is_none());
        assert!(view.find_group_by_name("outer").unwrap().is_none());
        assert_eq!(view.get_group(&inner.id).unwrap().unwrap().parent, None);
        assert!(view.user_group_ids(&alice.id).unwrap().is_empty());
        assert!(view.get_task(&task.id).unwrap().unwrap().assignee_groups.is_empty());

        let changes = ws.changes();
        assert_eq!(changes.deleted_groups.len(), 1);
        assert_eq!(changes.deleted_groups[0].entity, outer.id);
        assert!(changes.added_memberships.is_empty());
    }

    #[test]
    fn test_renamed_group_not_found_by_old_name() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let alice = seed_user(&mut store, "alice");
        let group = seed_group(&mut store, "ops", None, &alice.id);

        let mut ws = WorkingSet::new();
        let mut renamed = group.clone();
        renamed.name = "platform".to_string();
        ws.put_group(renamed);

        let view = ws.view(&store);
        assert!(view.find_group_by_name("ops").unwrap().is_none());
        assert_eq!(view.find_group_by_name("platform").unwrap().unwrap().id, group.id);
    }

    #[test]
    fn test_staged_group_found_by_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut ws = WorkingSet::new();
        ws.create_group(Group::new(
            "gp-00000001".to_string(),
            "ops".to_string(),
            "us-00000001".to_string(),
        ));
        let found = ws.view(&store).find_group_by_name("ops").unwrap().unwrap();
        assert_eq!(found.id, "gp-00000001");
    }
}
