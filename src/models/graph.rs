//! Graph traversal helpers shared by the group and prerequisite checks.
//!
//! Every walk keeps an explicit visited set, so malformed persisted data that
//! already contains a cycle terminates instead of looping.

use std::collections::HashSet;

use crate::Result;

/// Check whether `target` is reachable from `start` by following `next`.
///
/// `start` itself counts as reachable. Uses an explicit DFS stack rather than
/// recursion.
pub fn reaches<F>(start: &str, target: &str, mut next: F) -> Result<bool>
where
    F: FnMut(&str) -> Result<Vec<String>>,
{
    let mut visited = HashSet::new();
    let mut stack = vec![start.to_string()];

    while let Some(current) = stack.pop() {
        if current == target {
            return Ok(true);
        }

        if !visited.insert(current.clone()) {
            continue;
        }

        for neighbor in next(&current)? {
            if !visited.contains(&neighbor) {
                stack.push(neighbor);
            }
        }
    }

    Ok(false)
}

/// The nodes visited while following single-parent links upward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    /// Nodes in walk order, starting with the start node
    pub nodes: Vec<String>,

    /// Node whose parent link pointed back into the chain, if any
    pub cycle_at: Option<String>,
}

/// Follow `parent_of` upward from `start` until a root or a repeated node.
pub fn walk_chain<F>(start: &str, mut parent_of: F) -> Result<Chain>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    let mut chain = Chain::default();
    let mut visited = HashSet::new();
    let mut current = start.to_string();

    loop {
        visited.insert(current.clone());
        chain.nodes.push(current.clone());

        match parent_of(&current)? {
            Some(parent) if visited.contains(&parent) => {
                chain.cycle_at = Some(current);
                break;
            }
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(chain)
}
