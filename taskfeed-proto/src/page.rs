//! Request and response payloads exchanged with the task service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::category::{Category, ViewingContext};
use crate::task::{CompletionRecord, HistoryEntry, Priority, Task, TaskStatus, UserId, UserRef};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// A request for one page of a category feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Context the page is scoped to.
    pub context: ViewingContext,
    /// Category being fetched.
    pub category: Category,
    /// Fully rendered endpoint for this category and context.
    pub endpoint: Url,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: usize,
}

/// One page of a category feed as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Tasks on this page.
    pub tasks: Vec<Task>,
    /// Page size the service applied.
    pub page_size: usize,
}

impl Page {
    /// Number of tasks returned on this page.
    #[must_use]
    pub fn returned(&self) -> usize {
        self.tasks.len()
    }

    /// A short page is the only exhaustion signal.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.returned() < self.page_size
    }
}

/// Partial update sent with `patch_task`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub important_by: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<Vec<CompletionRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl TaskPatch {
    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.important_by.is_none()
            && self.completed_by.is_none()
            && self.assignee.is_none()
            && self.history.is_none()
    }

    /// Applies the set fields onto `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(important_by) = &self.important_by {
            task.important_by.clone_from(important_by);
        }
        if let Some(completed_by) = &self.completed_by {
            task.completed_by.clone_from(completed_by);
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(history) = &self.history {
            task.history.clone_from(history);
        }
    }
}

/// Errors raised when validating a [`NewTask`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long ({len} characters, max {max})")]
    TitleTooLong {
        /// Actual length in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Fields for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_at: DateTime<Utc>,
    pub priority: Priority,
    pub author: UserRef,
    pub assignee: UserRef,
}

impl NewTask {
    /// Checks the title against the service's limits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] for a blank title, or
    /// [`ValidationError::TitleTooLong`] above [`MAX_TASK_TITLE_LENGTH`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::TitleEmpty);
        }
        let len = self.title.chars().count();
        if len > MAX_TASK_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong {
                len,
                max: MAX_TASK_TITLE_LENGTH,
            });
        }
        Ok(())
    }
}
