//! Task service abstraction.
//!
//! Defines the [`TaskService`] trait the engine consumes to talk to the
//! remote task backend. The engine never inspects transport details; it
//! only reacts to success or failure outcomes. Concrete implementations:
//! - [`loopback::LoopbackService`]: in-process service for tests and demos

pub mod loopback;

use taskfeed_proto::codec::CodecError;
use taskfeed_proto::page::{NewTask, Page, PageRequest, TaskPatch};
use taskfeed_proto::task::{Task, TaskId};

/// Errors reported by a [`TaskService`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the service has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The request timed out before completing.
    #[error("request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Message returned by the service.
        message: String,
    },

    /// The task does not exist on the service.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Async request/response contract of the remote task backend.
///
/// Failures must be reported as `Err`; an implementation never answers a
/// failed mutation with stale data.
pub trait TaskService: Send + Sync {
    /// Fetch one page of a category for a viewing context.
    fn fetch_category_page(
        &self,
        request: &PageRequest,
    ) -> impl std::future::Future<Output = Result<Page, TransportError>> + Send;

    /// Apply a partial update to a task and return the stored result.
    fn patch_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, TransportError>> + Send;

    /// Create a task and return it as stored by the service.
    fn create_task(
        &self,
        fields: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, TransportError>> + Send;
}
