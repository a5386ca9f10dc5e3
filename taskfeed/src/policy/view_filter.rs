//! Display filter for pending-task views.
//!
//! Hides tasks the viewer already completed from shared views before the
//! server recomputes its categories. Never mutates feed state.

use taskfeed_proto::task::{Task, UserId};

/// Returns `false` if `task.completed_by` holds an entry for `viewer`.
#[must_use]
pub fn is_pending_for_viewer(task: &Task, viewer: &UserId) -> bool {
    !task.has_completed(viewer)
}

/// Keeps only the tasks still pending for `viewer`, preserving order.
#[must_use]
pub fn pending_view(tasks: &[Task], viewer: &UserId) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| is_pending_for_viewer(task, viewer))
        .cloned()
        .collect()
}
