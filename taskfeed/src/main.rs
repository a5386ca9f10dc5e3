//! Optimistic task-feed demo.
//!
//! Seeds an in-process task service for the viewer, activates the
//! configured categories, runs each mutation once and prints what every
//! feed holds afterwards. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/taskfeed/config.toml`).
//!
//! ```bash
//! cargo run --bin taskfeed -- --viewer alice
//!
//! # Pair view with debug logging
//! TASKFEED_LOG=debug cargo run --bin taskfeed -- --viewer alice --subject bob
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_appender::non_blocking::WorkerGuard;

use taskfeed::config::{CliArgs, ClientConfig};
use taskfeed::mutation::MutationCoordinator;
use taskfeed::observer::{ChannelObserver, FeedEvent};
use taskfeed::registry::FeedRegistry;
use taskfeed::transport::loopback::LoopbackService;
use taskfeed_proto::category::ViewingContext;
use taskfeed_proto::page::NewTask;
use taskfeed_proto::task::{
    CompletionRecord, Priority, Task, TaskId, TaskStatus, UserId, UserRef,
};

/// Second party used when no subject is configured.
const DEMO_COLLEAGUE: &str = "colleague";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let context = match config.to_context() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%context, "taskfeed starting");
    run_demo(&config, context).await;
    tracing::info!("taskfeed exiting");
    ExitCode::SUCCESS
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskfeed.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Task ids the demo mutates.
struct Seeded {
    assigned_to_viewer: TaskId,
    delegated: TaskId,
    awaiting_confirmation: TaskId,
}

async fn run_demo(config: &ClientConfig, context: ViewingContext) {
    let now = Utc::now();
    let viewer = context.viewer().clone();
    let colleague = context
        .subject()
        .cloned()
        .unwrap_or_else(|| UserId::new(DEMO_COLLEAGUE));
    let (tasks, seeded) = seed_tasks(&viewer, &colleague, now);

    let service = Arc::new(LoopbackService::with_tasks(now, tasks));
    let (observer, mut events) = ChannelObserver::channel(config.event_buffer);
    let registry = Arc::new(
        FeedRegistry::new(context.clone(), Arc::clone(&service), config.to_registry_config())
            .with_observer(Arc::new(observer)),
    );
    let coordinator = MutationCoordinator::new(Arc::clone(&registry));

    for category in &config.categories {
        if let Err(e) = registry.activate(&context, *category).await {
            eprintln!("{category}: {e}");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = {
        let registry = Arc::clone(&registry);
        let interval = config.poll_interval;
        tokio::spawn(async move { registry.run_poller(interval, shutdown_rx).await })
    };

    println!("viewing as {context}\n");
    print_feeds(&registry);

    report(
        "flag important",
        coordinator
            .toggle_importance(&context, &seeded.assigned_to_viewer)
            .await,
    );
    report(
        "complete",
        coordinator
            .toggle_completion(&context, &seeded.assigned_to_viewer)
            .await,
    );
    report(
        "send back",
        coordinator
            .reassign(&context, &seeded.awaiting_confirmation, None)
            .await,
    );

    service.fail_next_patch();
    report(
        "flag important (service down)",
        coordinator.toggle_importance(&context, &seeded.delegated).await,
    );

    let fields = NewTask {
        title: "Write release notes".to_string(),
        description: None,
        due_at: now,
        priority: Priority::Medium,
        author: UserRef::new(viewer.as_str(), viewer.as_str()),
        assignee: UserRef::new(viewer.as_str(), viewer.as_str()),
    };
    report("create", coordinator.create_task(&context, &fields).await);

    println!();
    print_feeds(&registry);

    let _ = shutdown_tx.send(true);
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "poller task failed");
    }
    drain_events(&mut events);
}

fn report<E: std::fmt::Display>(action: &str, result: Result<Task, E>) {
    match result {
        Ok(task) => println!("{action:<32} ok    {} ({})", task.title, task.status),
        Err(e) => println!("{action:<32} error {e}"),
    }
}

fn print_feeds(registry: &FeedRegistry<LoopbackService>) {
    for category in &registry.config().categories {
        let Some(state) = registry.feed_state(*category) else {
            continue;
        };
        let pending = registry.pending_tasks(*category).len();
        let more = if state.has_more { ", more available" } else { "" };
        println!(
            "{:<20} {:>3} tasks, {pending} pending (page {}{more})",
            category.as_str(),
            state.len,
            state.cursor
        );
    }
}

fn drain_events(events: &mut mpsc::Receiver<FeedEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            FeedEvent::MutationFailed { task_id, reason } => {
                println!("event: mutation on {task_id} failed: {reason}");
            }
            FeedEvent::FetchFailed { category, reason } => {
                println!("event: loading {category} failed: {reason}");
            }
        }
    }
}

fn seed_tasks(viewer: &UserId, colleague: &UserId, now: DateTime<Utc>) -> (Vec<Task>, Seeded) {
    let me = UserRef::new(viewer.as_str(), viewer.as_str());
    let them = UserRef::new(colleague.as_str(), colleague.as_str());
    let task = |title: &str, author: &UserRef, assignee: &UserRef, due_in_days: i64| Task {
        id: TaskId::new(),
        title: title.to_string(),
        description: None,
        status: TaskStatus::Pending,
        due_at: now + Duration::days(due_in_days),
        priority: Priority::Medium,
        author: author.clone(),
        assignee: assignee.clone(),
        important_by: Vec::new(),
        completed_by: Vec::new(),
        history: Vec::new(),
        created_at: now - Duration::days(7),
        updated_at: now - Duration::days(7),
    };

    let review = task("Review pull request", &them, &me, 0);
    let renew = task("Renew passport", &me, &me, -2);
    let plants = task("Water plants", &me, &me, 1);
    let offsite = task("Plan offsite", &me, &them, 3);
    let mut slides = task("Draft quarterly slides", &me, &them, -1);
    slides.completed_by.push(CompletionRecord::new(colleague.clone()));

    let seeded = Seeded {
        assigned_to_viewer: review.id.clone(),
        delegated: offsite.id.clone(),
        awaiting_confirmation: slides.id.clone(),
    };
    (vec![review, renew, plants, offsite, slides], seeded)
}
