//! Category membership rules.
//!
//! [`MembershipPolicy::still_belongs`] is consulted after a reclassifying
//! mutation to decide whether a feed keeps its copy of the task.
//! [`MembershipPolicy::admits`] places a freshly created task into feeds
//! that are already loaded. Server-confirmed categories such as
//! [`Category::NeedsFinishing`] keep the task by default; callers can
//! install their own rule per category.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskfeed_proto::category::{Category, ViewingContext};
use taskfeed_proto::task::{Task, TaskStatus, UserId};

use super::view_filter::is_pending_for_viewer;

/// Decides which categories a task belongs to from the client's point of view.
pub trait MembershipPolicy: Send + Sync {
    /// Whether a feed for `category` should keep `task` after a local mutation.
    fn still_belongs(&self, task: &Task, category: Category, context: &ViewingContext) -> bool;

    /// Whether a newly created `task` should be inserted into a loaded feed
    /// for `category`.
    fn admits(
        &self,
        task: &Task,
        category: Category,
        context: &ViewingContext,
        now: DateTime<Utc>,
    ) -> bool;
}

/// Rule installed for a single category, overriding the default.
pub type MembershipRule = Arc<dyn Fn(&Task, &ViewingContext) -> bool + Send + Sync>;

/// Default client-side membership rules.
#[derive(Clone, Default)]
pub struct DefaultMembership {
    overrides: HashMap<Category, MembershipRule>,
}

impl std::fmt::Debug for DefaultMembership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMembership")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DefaultMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the `still_belongs` rule for `category`.
    #[must_use]
    pub fn with_rule(
        mut self,
        category: Category,
        rule: impl Fn(&Task, &ViewingContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.overrides.insert(category, Arc::new(rule));
        self
    }
}

/// Whether `task` is between the parties the context is about.
fn involves(task: &Task, context: &ViewingContext) -> bool {
    match context {
        ViewingContext::Personal { viewer } => &task.assignee.id == viewer,
        ViewingContext::Pair { viewer, subject } => {
            let parties = (&task.author.id, &task.assignee.id);
            parties == (viewer, subject) || parties == (subject, viewer)
        }
    }
}

fn pending_for(task: &Task, viewer: &UserId) -> bool {
    task.status == TaskStatus::Pending && is_pending_for_viewer(task, viewer)
}

impl MembershipPolicy for DefaultMembership {
    fn still_belongs(&self, task: &Task, category: Category, context: &ViewingContext) -> bool {
        if let Some(rule) = self.overrides.get(&category) {
            return rule(task, context);
        }
        match category {
            Category::Today
            | Category::Overdue
            | Category::Upcoming
            | Category::AssignedToOthers => pending_for(task, context.viewer()),
            Category::Completed => task.status == TaskStatus::Completed,
            Category::Workload | Category::NeedsFinishing => true,
        }
    }

    fn admits(
        &self,
        task: &Task,
        category: Category,
        context: &ViewingContext,
        now: DateTime<Utc>,
    ) -> bool {
        let viewer = context.viewer();
        let today = now.date_naive();
        let due = task.due_at.date_naive();
        match category {
            Category::Today => involves(task, context) && pending_for(task, viewer) && due == today,
            Category::Overdue => {
                involves(task, context) && pending_for(task, viewer) && due < today
            }
            Category::Upcoming => {
                involves(task, context) && pending_for(task, viewer) && due > today
            }
            Category::AssignedToOthers => {
                &task.author.id == viewer
                    && &task.assignee.id != viewer
                    && context.subject().is_none_or(|subject| &task.assignee.id == subject)
                    && pending_for(task, viewer)
            }
            Category::Workload => involves(task, context),
            Category::Completed => involves(task, context) && task.status == TaskStatus::Completed,
            Category::NeedsFinishing => false,
        }
    }
}
