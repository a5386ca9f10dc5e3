//! Pure merge functions for page results.
//!
//! Appends use skip-if-present semantics: an entry already held by the feed
//! always wins over the same id arriving in a later page, so a stale server
//! copy can never overwrite optimistic local state.

use std::collections::HashMap;
use std::hash::BuildHasher;

use taskfeed_proto::task::{Task, TaskId};

/// Merges an appended page into a feed's entries.
///
/// Tasks whose id is already present are skipped. Returns how many tasks
/// were inserted.
pub fn merge_append<S: BuildHasher>(local: &mut HashMap<TaskId, Task, S>, page: Vec<Task>) -> usize {
    let mut inserted = 0;
    for task in page {
        if local.contains_key(&task.id) {
            continue;
        }
        local.insert(task.id.clone(), task);
        inserted += 1;
    }
    inserted
}

/// Builds a fresh entry map from a page that replaces the feed.
///
/// A page repeating an id keeps the first occurrence.
#[must_use]
pub fn replace_with(page: Vec<Task>) -> HashMap<TaskId, Task> {
    let mut entries = HashMap::with_capacity(page.len());
    merge_append(&mut entries, page);
    entries
}
