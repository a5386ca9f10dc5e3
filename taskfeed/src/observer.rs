//! Error surfacing callbacks.
//!
//! The engine's only outward calls: one notification per failed mutation
//! and one per failed page fetch. Stale responses are never reported.

use tokio::sync::mpsc;
use tracing::warn;

use taskfeed_proto::category::Category;
use taskfeed_proto::task::TaskId;

/// Receives error notifications for the presentation layer.
pub trait FeedObserver: Send + Sync {
    /// A mutation on `task_id` failed and was rolled back.
    fn on_mutation_error(&self, task_id: &TaskId, reason: &str);

    /// Loading a page of `category` failed; the feed kept its previous state.
    fn on_fetch_error(&self, category: Category, reason: &str);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FeedObserver for NoopObserver {
    fn on_mutation_error(&self, _task_id: &TaskId, _reason: &str) {}

    fn on_fetch_error(&self, _category: Category, _reason: &str) {}
}

/// Notification delivered by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A mutation failed and was rolled back.
    MutationFailed {
        /// The task whose mutation failed.
        task_id: TaskId,
        /// Human-readable failure reason.
        reason: String,
    },
    /// A page fetch failed.
    FetchFailed {
        /// The category being loaded.
        category: Category,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Observer that forwards notifications over a bounded channel.
///
/// Notifications are sent with `try_send`; when the receiver lags and the
/// buffer is full the event is dropped and logged.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<FeedEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    fn emit(&self, event: FeedEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "dropping feed event");
        }
    }
}

impl FeedObserver for ChannelObserver {
    fn on_mutation_error(&self, task_id: &TaskId, reason: &str) {
        self.emit(FeedEvent::MutationFailed {
            task_id: task_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_fetch_error(&self, category: Category, reason: &str) {
        self.emit(FeedEvent::FetchFailed {
            category,
            reason: reason.to_string(),
        });
    }
}
