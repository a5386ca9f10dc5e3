//! Task model and REST payload definitions for `taskfeed`.

pub mod category;
pub mod codec;
pub mod page;
pub mod task;

pub use category::{Category, ViewingContext};
pub use page::{MAX_TASK_TITLE_LENGTH, NewTask, Page, PageRequest, TaskPatch, ValidationError};
pub use task::{
    CompletionRecord, HistoryAction, HistoryEntry, Priority, Task, TaskId, TaskStatus, UserId,
    UserRef,
};
