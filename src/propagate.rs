use std::collections::VecDeque;

use crate::types::FieldStore;

/// Fields whose rules must re-run after `start` changes, in breadth-first
/// order over the "declares a dependency on" relation.
///
/// Each field appears at most once and `start` itself is never included.
/// Ties within one level follow field order.
pub(crate) fn affected_positions(store: &FieldStore, start: usize) -> Vec<usize> {
    let mut visited = vec![false; store.len()];
    visited[start] = true;
    let mut queue = VecDeque::from([start]);
    let mut order = Vec::new();

    while let Some(current) = queue.pop_front() {
        for &dependent in store.dependents_of(current) {
            if !visited[dependent] {
                visited[dependent] = true;
                order.push(dependent);
                queue.push_back(dependent);
            }
        }
    }
    order
}

/// Key-based form of [`affected_positions`]. An unknown key affects nothing.
#[must_use]
pub fn affected_fields(store: &FieldStore, start: &str) -> Vec<String> {
    store.position(start).map_or_else(Vec::new, |position| {
        affected_positions(store, position)
            .into_iter()
            .map(|p| store.at(p).key().to_owned())
            .collect()
    })
}
