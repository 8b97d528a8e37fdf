//! Dependency validation for the task prerequisite graph.
//!
//! Edges point from a task to its prerequisites. The graph must stay acyclic,
//! and a task may only be completed once every direct prerequisite is. That
//! last rule holds in both directions: a completed task never gains an open
//! prerequisite, and a prerequisite is never reopened under a completed task.

use crate::models::Task;
use crate::models::graph::reaches;
use crate::storage::Reader;
use crate::{Error, Result};

/// Would adding the edge `task_id -> prerequisite_id` close a cycle?
///
/// True when the task is the prerequisite itself, or when the task is already
/// reachable from the prerequisite by following existing prerequisite edges.
pub fn would_create_cycle<R: Reader + ?Sized>(
    reader: &R,
    task_id: &str,
    prerequisite_id: &str,
) -> Result<bool> {
    reaches(prerequisite_id, task_id, |id| {
        Ok(reader
            .get_task(id)?
            .map(|task| task.prerequisites)
            .unwrap_or_default())
    })
}

/// Fail with [`Error::Cycle`] if the edge would close a cycle.
pub fn check_prerequisite<R: Reader + ?Sized>(
    reader: &R,
    task_id: &str,
    prerequisite_id: &str,
) -> Result<()> {
    if task_id == prerequisite_id {
        return Err(Error::Cycle(format!("task {task_id} cannot depend on itself")));
    }
    if would_create_cycle(reader, task_id, prerequisite_id)? {
        return Err(Error::Cycle(format!(
            "{task_id} -> {prerequisite_id} would close a cycle: {prerequisite_id} already depends on {task_id}"
        )));
    }
    Ok(())
}

/// The first prerequisite, in declaration order, that is not completed.
///
/// Prerequisites that no longer exist are treated as satisfied.
pub fn first_unmet_prerequisite<R: Reader + ?Sized>(
    reader: &R,
    task: &Task,
) -> Result<Option<String>> {
    for prerequisite in &task.prerequisites {
        match reader.get_task(prerequisite)? {
            Some(p) if !p.is_completed() => return Ok(Some(p.id)),
            _ => {}
        }
    }
    Ok(None)
}

pub fn can_complete<R: Reader + ?Sized>(reader: &R, task: &Task) -> Result<bool> {
    Ok(first_unmet_prerequisite(reader, task)?.is_none())
}

/// Fail with [`Error::DependencyNotMet`] naming the first unmet prerequisite.
pub fn require_completable<R: Reader + ?Sized>(reader: &R, task: &Task) -> Result<()> {
    match first_unmet_prerequisite(reader, task)? {
        Some(prerequisite) => Err(Error::DependencyNotMet {
            task: task.id.clone(),
            prerequisite,
        }),
        None => Ok(()),
    }
}

/// Fail with [`Error::DependencyNotMet`] if `task` is completed and the new
/// prerequisite is not.
pub fn require_edge_keeps_completion(task: &Task, prerequisite: &Task) -> Result<()> {
    if task.is_completed() && !prerequisite.is_completed() {
        return Err(Error::DependencyNotMet {
            task: task.id.clone(),
            prerequisite: prerequisite.id.clone(),
        });
    }
    Ok(())
}

/// Fail with [`Error::DependencyNotMet`] if any completed task depends on
/// `task_id`, so it may not leave the completed state.
pub fn require_reopenable<R: Reader + ?Sized>(reader: &R, task_id: &str) -> Result<()> {
    for dependent in reader.dependent_ids(task_id)? {
        if let Some(task) = reader.get_task(&dependent)? {
            if task.is_completed() {
                return Err(Error::DependencyNotMet {
                    task: task.id,
                    prerequisite: task_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, TaskStatus, User};
    use std::collections::HashMap;

    /// Task-only reader; lets tests build graphs the store would refuse.
    #[derive(Default)]
    struct Graph {
        tasks: HashMap<String, Task>,
    }

    impl Graph {
        fn with(mut self, id: &str, prerequisites: &[&str], status: TaskStatus) -> Self {
            let mut task = Task::new(id.to_string(), id.to_string(), "us-00000001".to_string());
            task.prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
            task.status = status;
            self.tasks.insert(id.to_string(), task);
            self
        }

        fn task(&self, id: &str) -> &Task {
            &self.tasks[id]
        }
    }

    impl Reader for Graph {
        fn get_user(&self, _id: &str) -> Result<Option<User>> {
            Ok(None)
        }

        fn get_group(&self, _id: &str) -> Result<Option<Group>> {
            Ok(None)
        }

        fn find_group_by_name(&self, _name: &str) -> Result<Option<Group>> {
            Ok(None)
        }

        fn get_task(&self, id: &str) -> Result<Option<Task>> {
            Ok(self.tasks.get(id).cloned())
        }

        fn user_group_ids(&self, _user_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn dependent_ids(&self, task_id: &str) -> Result<Vec<String>> {
            let mut ids: Vec<String> = self
                .tasks
                .values()
                .filter(|t| t.prerequisites.iter().any(|p| p == task_id))
                .map(|t| t.id.clone())
                .collect();
            ids.sort();
            Ok(ids)
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = Graph::default().with("a", &[], TaskStatus::Todo);
        assert!(matches!(
            check_prerequisite(&graph, "a", "a"),
            Err(Error::Cycle(_))
        ));
    }

    #[test]
    fn test_transitive_cycle_detected() {
        // c -> b -> a
        let graph = Graph::default()
            .with("a", &[], TaskStatus::Todo)
            .with("b", &["a"], TaskStatus::Todo)
            .with("c", &["b"], TaskStatus::Todo);

        assert!(would_create_cycle(&graph, "a", "c").unwrap());
        assert!(!would_create_cycle(&graph, "c", "a").unwrap());
        assert!(check_prerequisite(&graph, "a", "c").is_err());
        // Rejection leaves the graph as it was
        assert!(graph.task("a").prerequisites.is_empty());
    }

    #[test]
    fn test_cycle_check_terminates_on_malformed_graph() {
        let graph = Graph::default()
            .with("a", &["b"], TaskStatus::Todo)
            .with("b", &["a"], TaskStatus::Todo)
            .with("z", &[], TaskStatus::Todo);
        assert!(!would_create_cycle(&graph, "z", "a").unwrap());
    }

    #[test]
    fn test_first_unmet_in_declaration_order() {
        let graph = Graph::default()
            .with("done", &[], TaskStatus::Completed)
            .with("late", &[], TaskStatus::Todo)
            .with("early", &[], TaskStatus::InProgress)
            .with("target", &["done", "early", "late"], TaskStatus::Todo);

        let target = graph.task("target");
        assert_eq!(
            first_unmet_prerequisite(&graph, target).unwrap().as_deref(),
            Some("early")
        );
        match require_completable(&graph, target) {
            Err(Error::DependencyNotMet { task, prerequisite }) => {
                assert_eq!(task, "target");
                assert_eq!(prerequisite, "early");
            }
            other => panic!("expected DependencyNotMet, got {other:?}"),
        }
    }

    #[test]
    fn test_completed_and_missing_prerequisites_satisfy() {
        let graph = Graph::default()
            .with("done", &[], TaskStatus::Completed)
            .with("target", &["done", "deleted"], TaskStatus::Todo);
        assert!(can_complete(&graph, graph.task("target")).unwrap());
    }

    #[test]
    fn test_completed_task_refuses_open_prerequisite() {
        let graph = Graph::default()
            .with("done", &[], TaskStatus::Completed)
            .with("open", &[], TaskStatus::Todo)
            .with("closed", &[], TaskStatus::Completed)
            .with("fresh", &[], TaskStatus::Todo);

        match require_edge_keeps_completion(graph.task("done"), graph.task("open")) {
            Err(Error::DependencyNotMet { task, prerequisite }) => {
                assert_eq!(task, "done");
                assert_eq!(prerequisite, "open");
            }
            other => panic!("expected DependencyNotMet, got {other:?}"),
        }
        assert!(require_edge_keeps_completion(graph.task("done"), graph.task("closed")).is_ok());
        assert!(require_edge_keeps_completion(graph.task("fresh"), graph.task("open")).is_ok());
    }

    #[test]
    fn test_reopen_blocked_by_completed_dependent() {
        let graph = Graph::default()
            .with("base", &[], TaskStatus::Completed)
            .with("waiting", &["base"], TaskStatus::Todo)
            .with("finished", &["base"], TaskStatus::Completed)
            .with("loose", &[], TaskStatus::Completed);

        match require_reopenable(&graph, "base") {
            Err(Error::DependencyNotMet { task, prerequisite }) => {
                assert_eq!(task, "finished");
                assert_eq!(prerequisite, "base");
            }
            other => panic!("expected DependencyNotMet, got {other:?}"),
        }
        assert!(require_reopenable(&graph, "loose").is_ok());
        assert!(require_reopenable(&graph, "waiting").is_ok());
    }
}
