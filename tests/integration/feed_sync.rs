//! Integration tests for category feed loading.
//!
//! Pagination, append deduplication, superseded and stale-context loads,
//! and fetch failure handling, all against `LoopbackService`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use taskfeed::feed::PageSummary;
use taskfeed::observer::{ChannelObserver, FeedEvent};
use taskfeed::registry::{FeedError, FeedRegistry, LoadOutcome, RegistryConfig};
use taskfeed::transport::loopback::LoopbackService;
use taskfeed_proto::category::{Category, ViewingContext};
use taskfeed_proto::task::{Priority, Task, TaskId, TaskStatus, UserRef};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

/// A pending task due today at `hour`.
fn make_task(title: &str, author: &str, assignee: &str, hour: u32) -> Task {
    Task {
        id: TaskId::new(),
        title: title.to_string(),
        description: None,
        status: TaskStatus::Pending,
        due_at: Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap(),
        priority: Priority::Medium,
        author: UserRef::new(author, author),
        assignee: UserRef::new(assignee, assignee),
        important_by: Vec::new(),
        completed_by: Vec::new(),
        history: Vec::new(),
        created_at: now(),
        updated_at: now(),
    }
}

/// `count` tasks from boss to me, due at successive hours from 1:00.
fn assigned_to_me(count: u32) -> Vec<Task> {
    (1..=count)
        .map(|hour| make_task(&format!("task {hour}"), "boss", "me", hour))
        .collect()
}

struct Harness {
    service: Arc<LoopbackService>,
    registry: Arc<FeedRegistry<LoopbackService>>,
    events: mpsc::Receiver<FeedEvent>,
}

fn make_harness(tasks: Vec<Task>, page_size: usize) -> Harness {
    let service = Arc::new(LoopbackService::with_tasks(now(), tasks));
    let (observer, events) = ChannelObserver::channel(16);
    let config = RegistryConfig {
        page_size,
        ..RegistryConfig::default()
    };
    let registry = Arc::new(
        FeedRegistry::new(me(), Arc::clone(&service), config).with_observer(Arc::new(observer)),
    );
    Harness {
        service,
        registry,
        events,
    }
}

fn me() -> ViewingContext {
    ViewingContext::personal("me")
}

fn loaded(outcome: LoadOutcome) -> PageSummary {
    match outcome {
        LoadOutcome::Loaded(summary) => summary,
        other => panic!("expected a loaded page, got {other:?}"),
    }
}

// ===========================================================================
// Pagination
// ===========================================================================

#[tokio::test]
async fn short_page_exhausts_feed() {
    let h = make_harness(assigned_to_me(5), 2);
    let ctx = me();

    let first = loaded(h.registry.activate(&ctx, Category::Today).await.unwrap());
    assert_eq!(first.returned, 2);
    assert!(first.has_more);

    let second = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());
    assert_eq!(second.returned, 2);
    assert!(second.has_more);

    let third = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());
    assert_eq!(third.returned, 1);
    assert!(!third.has_more);

    let state = h.registry.feed_state(Category::Today).unwrap();
    assert_eq!(state.cursor, 3);
    assert_eq!(state.len, 5);
    assert!(!state.loading);
}

#[tokio::test]
async fn load_more_after_exhaustion_is_noop() {
    let h = make_harness(assigned_to_me(1), 2);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();

    let outcome = h.registry.load_more(&ctx, Category::Today).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Skipped);
    assert_eq!(h.service.fetch_count(), 1);
}

#[tokio::test]
async fn empty_first_page_is_valid() {
    let h = make_harness(vec![], 20);
    let summary = loaded(h.registry.activate(&me(), Category::Overdue).await.unwrap());
    assert_eq!(summary.returned, 0);
    assert!(!summary.has_more);
    assert!(h.registry.tasks(Category::Overdue).is_empty());
}

#[tokio::test]
async fn exact_multiple_needs_one_empty_page() {
    let h = make_harness(assigned_to_me(4), 2);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();
    h.registry.load_more(&ctx, Category::Today).await.unwrap();
    assert!(h.registry.feed_state(Category::Today).unwrap().has_more);

    let last = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());
    assert_eq!(last.returned, 0);
    assert!(!last.has_more);
    assert_eq!(h.registry.tasks(Category::Today).len(), 4);
}

// ===========================================================================
// Merge semantics
// ===========================================================================

#[tokio::test]
async fn append_skips_tasks_already_held() {
    let tasks = assigned_to_me(3);
    let second_id = tasks[1].id.clone();
    let h = make_harness(tasks, 2);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();

    // Local edit the server has not seen.
    h.registry
        .apply_mutation(&ctx, &second_id, |t| {
            let mut next = t.clone();
            next.title = "edited locally".to_string();
            next
        })
        .unwrap();

    // An earlier task shifts the server's ordering so page 2 repeats task 2.
    h.service.insert(make_task("early", "boss", "me", 0));

    let summary = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());
    assert_eq!(summary.returned, 2);
    assert_eq!(summary.inserted, 1);
    assert_eq!(h.registry.tasks(Category::Today).len(), 3);
    assert_eq!(h.registry.find(&second_id).unwrap().title, "edited locally");
}

#[tokio::test]
async fn refresh_drops_tasks_the_server_no_longer_lists() {
    let tasks = assigned_to_me(2);
    let gone = tasks[0].id.clone();
    let h = make_harness(tasks, 20);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();

    h.service.update(&gone, |t| t.status = TaskStatus::Completed);
    let summary = loaded(h.registry.refresh(&ctx, Category::Today).await.unwrap());

    assert_eq!(summary.returned, 1);
    assert!(h.registry.holders(&gone).is_empty());
}

#[tokio::test]
async fn tasks_are_listed_most_recently_updated_first() {
    let mut tasks = assigned_to_me(3);
    tasks[2].updated_at = now() + chrono::Duration::hours(1);
    let newest = tasks[2].id.clone();
    let h = make_harness(tasks, 20);
    h.registry.activate(&me(), Category::Today).await.unwrap();

    let listed = h.registry.tasks(Category::Today);
    assert_eq!(listed[0].id, newest);
}

// ===========================================================================
// Late responses
// ===========================================================================

#[tokio::test]
async fn response_after_context_switch_is_discarded() {
    let h = make_harness(assigned_to_me(2), 20);
    let boss = ViewingContext::personal("boss");
    h.service.hold_fetches();

    let me_ctx = me();
    let (outcome, ()) = tokio::join!(h.registry.activate(&me_ctx, Category::Today), async {
        tokio::task::yield_now().await;
        assert!(h.registry.switch_context(&boss));
        h.service.release_fetches(1);
    });

    assert_eq!(outcome.unwrap(), LoadOutcome::Discarded);
    assert_eq!(h.registry.context(), boss);
    assert!(h.registry.feed_state(Category::Today).is_none());
    assert!(h.registry.tasks(Category::Today).is_empty());
}

#[tokio::test]
async fn refresh_supersedes_in_flight_append() {
    let h = make_harness(assigned_to_me(3), 2);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();
    h.service.hold_fetches();

    let (more, refreshed, ()) = tokio::join!(
        h.registry.load_more(&ctx, Category::Today),
        async {
            tokio::task::yield_now().await;
            h.registry.refresh(&ctx, Category::Today).await
        },
        async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            h.service.release_fetches(2);
        }
    );

    assert_eq!(more.unwrap(), LoadOutcome::Discarded);
    let summary = loaded(refreshed.unwrap());
    assert_eq!(summary.returned, 2);
    let state = h.registry.feed_state(Category::Today).unwrap();
    assert_eq!(state.cursor, 1);
    assert_eq!(state.len, 2);
    assert!(!state.loading);
}

// ===========================================================================
// Failures
// ===========================================================================

#[tokio::test]
async fn fetch_failure_leaves_feed_untouched() {
    let mut h = make_harness(assigned_to_me(3), 2);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();
    let before = h.registry.feed_state(Category::Today).unwrap();
    let tasks_before = h.registry.tasks(Category::Today);

    h.service.fail_next_fetch();
    let result = h.registry.load_more(&ctx, Category::Today).await;
    assert!(matches!(result, Err(FeedError::Transport(_))));
    assert_eq!(h.registry.feed_state(Category::Today).unwrap(), before);
    assert_eq!(h.registry.tasks(Category::Today), tasks_before);

    match h.events.try_recv().unwrap() {
        FeedEvent::FetchFailed { category, .. } => assert_eq!(category, Category::Today),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(h.events.try_recv().is_err());

    // The failed page is retried by the next load_more.
    let summary = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());
    assert_eq!(summary.returned, 1);
    assert_eq!(h.registry.feed_state(Category::Today).unwrap().cursor, 2);
}

#[tokio::test]
async fn failed_activation_can_be_refreshed() {
    let mut h = make_harness(assigned_to_me(1), 20);
    let ctx = me();
    h.service.fail_next_fetch();

    assert!(h.registry.activate(&ctx, Category::Today).await.is_err());
    assert!(matches!(
        h.events.try_recv().unwrap(),
        FeedEvent::FetchFailed { .. }
    ));
    assert!(h.registry.tasks(Category::Today).is_empty());

    let summary = loaded(h.registry.refresh(&ctx, Category::Today).await.unwrap());
    assert_eq!(summary.returned, 1);
}

#[tokio::test]
async fn load_more_after_failed_activation_loads_first_page() {
    let mut h = make_harness(assigned_to_me(3), 2);
    let ctx = me();
    h.service.fail_next_fetch();
    assert!(h.registry.activate(&ctx, Category::Today).await.is_err());
    assert!(h.events.try_recv().is_ok());

    let summary = loaded(h.registry.load_more(&ctx, Category::Today).await.unwrap());

    assert_eq!(summary.returned, 2);
    let pages: Vec<u32> = h.service.fetches().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 1]);
    assert_eq!(h.registry.tasks(Category::Today).len(), 2);
    assert_eq!(h.registry.feed_state(Category::Today).unwrap().cursor, 1);
}

#[tokio::test]
async fn stale_responses_are_not_reported() {
    let mut h = make_harness(assigned_to_me(1), 20);
    h.service.hold_fetches();
    h.service.fail_next_fetch();

    let me_ctx = me();
    let (outcome, ()) = tokio::join!(h.registry.activate(&me_ctx, Category::Today), async {
        tokio::task::yield_now().await;
        h.registry.switch_context(&ViewingContext::personal("boss"));
        h.service.release_fetches(1);
    });

    assert_eq!(outcome.unwrap(), LoadOutcome::Discarded);
    assert!(h.events.try_recv().is_err());
}

// ===========================================================================
// Viewing contexts
// ===========================================================================

#[tokio::test]
async fn pair_context_scopes_requests_to_both_parties() {
    let tasks = vec![
        make_task("from bob", "bob", "me", 9),
        make_task("from carol", "carol", "me", 10),
    ];
    let h = make_harness(tasks, 20);
    let pair = ViewingContext::pair("me", "bob");

    h.registry.activate(&pair, Category::Today).await.unwrap();

    let listed = h.registry.tasks(Category::Today);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "from bob");

    let request = &h.service.fetches()[0];
    assert_eq!(request.context, pair);
    let query = request.endpoint.query().unwrap();
    assert!(query.contains("viewer=me"));
    assert!(query.contains("subject=bob"));
    assert!(query.contains("page=1"));
}

#[tokio::test]
async fn switching_categories_reloads_on_return() {
    let h = make_harness(assigned_to_me(2), 20);
    let ctx = me();
    h.registry.activate(&ctx, Category::Today).await.unwrap();
    h.registry.activate(&ctx, Category::Workload).await.unwrap();

    h.service.insert(make_task("new", "boss", "me", 11));
    h.registry.activate(&ctx, Category::Today).await.unwrap();

    assert_eq!(h.registry.tasks(Category::Today).len(), 3);
    assert_eq!(h.registry.tasks(Category::Workload).len(), 2);
    assert_eq!(
        h.registry.categories(),
        vec![Category::Today, Category::Workload]
    );
}
