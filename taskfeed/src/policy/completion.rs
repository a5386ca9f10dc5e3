//! Pure completion, reassignment and importance transitions.
//!
//! Every function takes the current task by reference and returns the next
//! state; callers decide which feeds receive the result.

use chrono::{DateTime, Utc};
use taskfeed_proto::task::{
    CompletionRecord, HistoryAction, HistoryEntry, Task, TaskStatus, UserId, UserRef,
};

use super::view_filter::is_pending_for_viewer;

/// Where a task stands in the two-party completion flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The assignee has not completed the task.
    Open,
    /// The assignee completed; the author has not confirmed yet.
    AwaitingConfirmation,
    /// Both parties are done, or the self-owned sentinel is present.
    Done,
}

/// Marks the viewer's part of `task` as completed.
///
/// A self-authored, self-assigned task completed by its owner gets exactly
/// two identical records for the viewer; this sentinel marks the task as
/// terminally completed. Otherwise any existing record for the viewer is
/// replaced by one fresh record and other parties' records are kept.
/// `status` is set to [`TaskStatus::Completed`] optimistically in both cases.
#[must_use]
pub fn complete(task: &Task, viewer: &UserId, now: DateTime<Utc>) -> Task {
    let mut next = task.clone();
    if &task.author.id == viewer && &task.assignee.id == viewer {
        next.completed_by = vec![CompletionRecord::new(viewer.clone()); 2];
    } else {
        next.completed_by.retain(|record| &record.user_id != viewer);
        next.completed_by.push(CompletionRecord::new(viewer.clone()));
    }
    next.status = TaskStatus::Completed;
    next.history.push(HistoryEntry {
        user_id: viewer.clone(),
        action: HistoryAction::Completed,
        at: now,
    });
    next.touch(now);
    next
}

/// Withdraws the viewer's completion and reopens the task.
#[must_use]
pub fn uncomplete(task: &Task, viewer: &UserId, now: DateTime<Utc>) -> Task {
    let mut next = task.clone();
    next.completed_by.retain(|record| &record.user_id != viewer);
    next.status = TaskStatus::Pending;
    next.history.push(HistoryEntry {
        user_id: viewer.clone(),
        action: HistoryAction::Reopened,
        at: now,
    });
    next.touch(now);
    next
}

/// Completes the task if it is still pending for the viewer, reopens it otherwise.
#[must_use]
pub fn toggle_completion(task: &Task, viewer: &UserId, now: DateTime<Utc>) -> Task {
    if is_pending_for_viewer(task, viewer) {
        complete(task, viewer, now)
    } else {
        uncomplete(task, viewer, now)
    }
}

/// Sends a task back to its assignee, optionally handing it to someone else.
///
/// The current assignee's completion records are dropped, the task becomes
/// pending again and the most recent history entry is discarded. Other
/// parties' completion records are untouched. When the assignee changes a
/// `Reassigned` entry is recorded for `actor`.
#[must_use]
pub fn reassign(
    task: &Task,
    actor: &UserId,
    new_assignee: Option<&UserRef>,
    now: DateTime<Utc>,
) -> Task {
    let mut next = task.clone();
    let assignee = task.assignee.id.clone();
    next.completed_by.retain(|record| record.user_id != assignee);
    next.status = TaskStatus::Pending;
    next.history.pop();
    if let Some(new_assignee) = new_assignee.filter(|user| user.id != assignee) {
        next.assignee = new_assignee.clone();
        next.history.push(HistoryEntry {
            user_id: actor.clone(),
            action: HistoryAction::Reassigned,
            at: now,
        });
    }
    next.touch(now);
    next
}

/// Adds or removes the viewer from `important_by`, keeping one entry per user.
#[must_use]
pub fn toggle_importance(task: &Task, viewer: &UserId, now: DateTime<Utc>) -> Task {
    let mut next = task.clone();
    if task.is_important_for(viewer) {
        next.important_by.retain(|id| id != viewer);
    } else {
        next.important_by.push(viewer.clone());
    }
    next.touch(now);
    next
}

/// Classifies a task in the completion flow, independent of the viewer.
#[must_use]
pub fn classify(task: &Task) -> Classification {
    let author = &task.author.id;
    let assignee = &task.assignee.id;
    if task.is_self_owned() {
        return if task.completion_count(author) >= 2 {
            Classification::Done
        } else if task.has_completed(author) {
            Classification::AwaitingConfirmation
        } else {
            Classification::Open
        };
    }
    match (task.has_completed(assignee), task.has_completed(author)) {
        (true, true) => Classification::Done,
        (true, false) => Classification::AwaitingConfirmation,
        (false, _) => Classification::Open,
    }
}

/// Returns `true` if `viewer` authored the task and still has to confirm
/// the assignee's completion.
#[must_use]
pub fn awaiting_confirmation_by(task: &Task, viewer: &UserId) -> bool {
    &task.author.id == viewer && classify(task) == Classification::AwaitingConfirmation
}
