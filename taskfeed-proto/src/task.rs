//! Task model shared between the feed engine and the REST backend.
//!
//! A [`Task`] is copied into every feed that holds it. Completion tracking
//! lives in [`Task::completed_by`], an ordered list of [`CompletionRecord`]
//! values rather than a set: the self-owned completion sentinel writes the
//! same record twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a user account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this user ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a user together with their display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// The referenced user.
    pub id: UserId,
    /// Display name at the time the task was fetched.
    pub name: String,
}

impl UserRef {
    /// Creates a user reference.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
        }
    }
}

/// Authoritative server-side status of a task.
///
/// This may lag the locally derived "pending for me" view; see
/// [`Task::has_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task still has outstanding work.
    Pending,
    /// Task has been completed.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// One party's completion of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// The user who completed their part.
    pub user_id: UserId,
}

impl CompletionRecord {
    /// Creates a completion record for `user_id`.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// What happened in a [`HistoryEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Completed,
    Reopened,
    Reassigned,
}

/// An entry in a task's local history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who performed the action.
    pub user_id: UserId,
    /// The action performed.
    pub action: HistoryAction,
    /// When the action happened.
    pub at: DateTime<Utc>,
}

/// A unit of work as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Server-side status.
    pub status: TaskStatus,
    /// Due date.
    pub due_at: DateTime<Utc>,
    /// Priority.
    pub priority: Priority,
    /// The user who created the task.
    pub author: UserRef,
    /// The user responsible for completing the task.
    pub assignee: UserRef,
    /// Users who flagged the task important (set semantics).
    #[serde(default)]
    pub important_by: Vec<UserId>,
    /// Completion records, in the order they were written.
    #[serde(default)]
    pub completed_by: Vec<CompletionRecord>,
    /// Local history list, most recent last.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time, bumped by every optimistic mutation.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns `true` if `user` has flagged this task important.
    #[must_use]
    pub fn is_important_for(&self, user: &UserId) -> bool {
        self.important_by.iter().any(|id| id == user)
    }

    /// Returns `true` if `completed_by` holds at least one record for `user`.
    #[must_use]
    pub fn has_completed(&self, user: &UserId) -> bool {
        self.completion_count(user) > 0
    }

    /// Number of completion records written for `user`.
    #[must_use]
    pub fn completion_count(&self, user: &UserId) -> usize {
        self.completed_by
            .iter()
            .filter(|record| &record.user_id == user)
            .count()
    }

    /// Returns `true` if the author is also the assignee.
    #[must_use]
    pub fn is_self_owned(&self) -> bool {
        self.author.id == self.assignee.id
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
