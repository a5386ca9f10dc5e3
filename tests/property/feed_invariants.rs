//! Property-based tests for feed and completion invariants.
//!
//! Uses proptest to verify:
//! 1. Appending any sequence of pages never duplicates a task id.
//! 2. Appending never overwrites a locally edited task.
//! 3. Completion writes exactly one record per viewer, or the two-record
//!    sentinel for self-owned tasks, and leaves other parties alone.
//! 4. Importance toggling has set semantics.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use taskfeed::feed::{CategoryFeed, LoadMode};
use taskfeed::policy::completion::{complete, reassign, toggle_importance, uncomplete};
use taskfeed_proto::category::Category;
use taskfeed_proto::page::Page;
use taskfeed_proto::task::{
    CompletionRecord, Priority, Task, TaskId, TaskStatus, UserId, UserRef,
};

const USERS: [&str; 3] = ["ann", "ben", "cat"];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

fn make_task(n: u128, author: &str, assignee: &str) -> Task {
    Task {
        id: TaskId::from_uuid(Uuid::from_u128(n + 1)),
        title: format!("task {n}"),
        description: None,
        status: TaskStatus::Pending,
        due_at: now(),
        priority: Priority::Low,
        author: UserRef::new(author, author),
        assignee: UserRef::new(assignee, assignee),
        important_by: Vec::new(),
        completed_by: Vec::new(),
        history: Vec::new(),
        created_at: now(),
        updated_at: now(),
    }
}

// --- Strategies ---

fn arb_user() -> impl Strategy<Value = &'static str> {
    prop::sample::select(USERS.to_vec())
}

/// Pages drawn from a small pool of task numbers so they overlap.
fn arb_pages() -> impl Strategy<Value = Vec<Vec<u128>>> {
    prop::collection::vec(prop::collection::vec(0..12u128, 0..6), 1..8)
}

/// A task between arbitrary parties with arbitrary prior completions.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_user(),
        arb_user(),
        prop::collection::vec(arb_user(), 0..4),
        prop::collection::vec(arb_user(), 0..4),
    )
        .prop_map(|(author, assignee, completed, important)| {
            let mut task = make_task(0, author, assignee);
            task.completed_by = completed
                .into_iter()
                .map(|u| CompletionRecord::new(UserId::new(u)))
                .collect();
            let mut seen = HashSet::new();
            task.important_by = important
                .into_iter()
                .filter(|u| seen.insert(*u))
                .map(UserId::new)
                .collect();
            task
        })
}

fn page_of(numbers: &[u128], page_size: usize) -> Page {
    Page {
        tasks: numbers.iter().map(|n| make_task(*n, "ann", "ben")).collect(),
        page_size,
    }
}

fn records_of<'a>(task: &'a Task, user: &UserId) -> Vec<&'a CompletionRecord> {
    task.completed_by
        .iter()
        .filter(|record| &record.user_id == user)
        .collect()
}

proptest! {
    #[test]
    fn append_never_duplicates_ids(pages in arb_pages()) {
        let mut feed = CategoryFeed::new(Category::Workload);
        let mut expected = HashSet::new();
        for (i, numbers) in pages.iter().enumerate() {
            let mode = if i == 0 { LoadMode::Replace } else { LoadMode::Append };
            let page_number = u32::try_from(i + 1).unwrap();
            let ticket = feed.begin_load(page_number, mode, 5);
            feed.finish_load(&ticket, page_of(numbers, 5)).unwrap();
            expected.extend(numbers.iter().copied());
        }

        let ids: Vec<TaskId> = feed.tasks().into_iter().map(|t| t.id).collect();
        let unique: HashSet<&TaskId> = ids.iter().collect();
        prop_assert_eq!(unique.len(), ids.len());
        prop_assert_eq!(ids.len(), expected.len());
    }

    #[test]
    fn append_keeps_local_edits(pages in arb_pages(), edited in 0..12u128) {
        let mut feed = CategoryFeed::new(Category::Workload);
        let ticket = feed.begin_load(1, LoadMode::Replace, 5);
        feed.finish_load(&ticket, page_of(&[edited], 5)).unwrap();

        let mut local = make_task(edited, "ann", "ben");
        local.title = "edited".to_string();
        feed.upsert_local(local.clone());

        for (i, numbers) in pages.iter().enumerate() {
            let ticket = feed.begin_load(u32::try_from(i + 2).unwrap(), LoadMode::Append, 5);
            feed.finish_load(&ticket, page_of(numbers, 5)).unwrap();
        }
        prop_assert_eq!(feed.get(&local.id), Some(&local));
    }

    #[test]
    fn completion_writes_one_record_or_sentinel(task in arb_task(), viewer in arb_user()) {
        let viewer = UserId::new(viewer);
        let done = complete(&task, &viewer, now());

        prop_assert_eq!(done.status, TaskStatus::Completed);
        if task.author.id == viewer && task.assignee.id == viewer {
            prop_assert_eq!(done.completed_by.len(), 2);
            prop_assert_eq!(done.completion_count(&viewer), 2);
        } else {
            prop_assert_eq!(done.completion_count(&viewer), 1);
            for user in USERS.iter().map(|u| UserId::new(*u)).filter(|u| u != &viewer) {
                prop_assert_eq!(records_of(&done, &user), records_of(&task, &user));
            }
        }
    }

    #[test]
    fn uncomplete_clears_only_the_viewer(task in arb_task(), viewer in arb_user()) {
        let viewer = UserId::new(viewer);
        let reopened = uncomplete(&complete(&task, &viewer, now()), &viewer, now());

        prop_assert!(!reopened.has_completed(&viewer));
        prop_assert_eq!(reopened.status, TaskStatus::Pending);
    }

    #[test]
    fn reassign_clears_only_the_assignee(task in arb_task(), actor in arb_user()) {
        let actor = UserId::new(actor);
        let sent_back = reassign(&task, &actor, None, now());
        let assignee = &task.assignee.id;

        prop_assert!(!sent_back.has_completed(assignee));
        prop_assert_eq!(sent_back.status, TaskStatus::Pending);
        for user in USERS.iter().map(|u| UserId::new(*u)).filter(|u| u != assignee) {
            prop_assert_eq!(records_of(&sent_back, &user), records_of(&task, &user));
        }
    }

    #[test]
    fn importance_has_set_semantics(task in arb_task(), viewer in arb_user()) {
        let viewer = UserId::new(viewer);
        let once = toggle_importance(&task, &viewer, now());
        let twice = toggle_importance(&once, &viewer, now());

        prop_assert_eq!(once.is_important_for(&viewer), !task.is_important_for(&viewer));
        prop_assert!(once.important_by.iter().filter(|u| *u == &viewer).count() <= 1);

        let before: HashSet<&UserId> = task.important_by.iter().collect();
        let after: HashSet<&UserId> = twice.important_by.iter().collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(twice.important_by.len(), task.important_by.len());
    }
}
