//! Task categories and viewing contexts.
//!
//! A [`Category`] names a server-filtered view of tasks. A
//! [`ViewingContext`] identifies whose tasks are being shown; every
//! category endpoint is parameterized by it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::task::UserId;

/// A named, server-filtered view of tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Pending tasks due today.
    Today,
    /// Pending tasks past their due date.
    Overdue,
    /// Pending tasks due after today.
    Upcoming,
    /// Pending tasks the viewer authored for someone else.
    AssignedToOthers,
    /// Tasks awaiting the viewer's confirmation; membership is decided by the server.
    NeedsFinishing,
    /// Every task assigned to the viewer, regardless of status.
    Workload,
    /// Completed tasks.
    Completed,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 7] = [
        Self::Today,
        Self::Overdue,
        Self::Upcoming,
        Self::AssignedToOthers,
        Self::NeedsFinishing,
        Self::Workload,
        Self::Completed,
    ];

    /// Wire name used in endpoints and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Overdue => "overdue",
            Self::Upcoming => "upcoming",
            Self::AssignedToOthers => "assigned-to-others",
            Self::NeedsFinishing => "needs-finishing",
            Self::Workload => "workload",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Identifies whose task feeds are being shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewingContext {
    /// The viewer's own tasks.
    Personal {
        /// The signed-in user.
        viewer: UserId,
    },
    /// Tasks exchanged between the viewer and one other user.
    Pair {
        /// The signed-in user.
        viewer: UserId,
        /// The other user whose shared tasks are shown.
        subject: UserId,
    },
}

impl ViewingContext {
    /// Personal context for `viewer`.
    pub fn personal(viewer: impl Into<String>) -> Self {
        Self::Personal {
            viewer: UserId::new(viewer),
        }
    }

    /// Cross-user context between `viewer` and `subject`.
    pub fn pair(viewer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::Pair {
            viewer: UserId::new(viewer),
            subject: UserId::new(subject),
        }
    }

    /// The signed-in user acting in this context.
    #[must_use]
    pub const fn viewer(&self) -> &UserId {
        match self {
            Self::Personal { viewer } | Self::Pair { viewer, .. } => viewer,
        }
    }

    /// The other user in a pair context.
    #[must_use]
    pub const fn subject(&self) -> Option<&UserId> {
        match self {
            Self::Personal { .. } => None,
            Self::Pair { subject, .. } => Some(subject),
        }
    }
}

impl std::fmt::Display for ViewingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal { viewer } => write!(f, "{viewer}"),
            Self::Pair { viewer, subject } => write!(f, "{viewer}<->{subject}"),
        }
    }
}
