//! Optimistic task mutations.
//!
//! [`MutationCoordinator`] runs each domain mutation in three steps: apply
//! the new state to every feed holding the task, send the patch, and undo
//! on failure. Importance toggles never change category membership, so a
//! failed patch restores the pre-mutation copies. Completion and
//! reassignment can move a task between categories; a failed patch there
//! reloads the active category instead, since removed entries cannot be put
//! back without knowing the server's categorisation.
//!
//! On success nothing is reconciled: the server's answer is logged and the
//! optimistic state stands until the next natural refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use taskfeed_proto::category::{Category, ViewingContext};
use taskfeed_proto::page::{NewTask, TaskPatch, ValidationError};
use taskfeed_proto::task::{Task, TaskId, UserRef};

use crate::policy::completion;
use crate::policy::membership::{DefaultMembership, MembershipPolicy};
use crate::registry::{AppliedMutation, FeedRegistry, LoadOutcome};
use crate::transport::{TaskService, TransportError};

/// Source of the current time for `updated_at` bumps and date rules.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors returned by mutations.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// No feed holds the task, so there is nothing to mutate.
    #[error("task {0} is not held by any feed")]
    TaskNotFound(TaskId),

    /// The new task failed validation before being sent.
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),

    /// The service rejected the mutation; local state was rolled back.
    #[error("mutation failed: {0}")]
    Transport(#[from] TransportError),
}

/// Executes mutations against a [`FeedRegistry`].
pub struct MutationCoordinator<S> {
    registry: Arc<FeedRegistry<S>>,
    membership: Arc<dyn MembershipPolicy>,
    clock: Clock,
}

impl<S: TaskService> MutationCoordinator<S> {
    /// Creates a coordinator with the default membership rules and the system clock.
    pub fn new(registry: Arc<FeedRegistry<S>>) -> Self {
        Self {
            registry,
            membership: Arc::new(DefaultMembership::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the membership rules used for reclassification.
    #[must_use]
    pub fn with_membership(mut self, membership: Arc<dyn MembershipPolicy>) -> Self {
        self.membership = membership;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The registry mutations are applied to.
    pub const fn registry(&self) -> &Arc<FeedRegistry<S>> {
        &self.registry
    }

    /// Flags or unflags the task as important for the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::TaskNotFound`] if no feed holds the task, or
    /// [`MutationError::Transport`] after restoring every touched feed.
    pub async fn toggle_importance(
        &self,
        context: &ViewingContext,
        id: &TaskId,
    ) -> Result<Task, MutationError> {
        let now = (self.clock)();
        let viewer = context.viewer().clone();
        let applied = self
            .registry
            .apply_mutation(context, id, |task| {
                completion::toggle_importance(task, &viewer, now)
            })
            .ok_or_else(|| MutationError::TaskNotFound(id.clone()))?;

        let patch = TaskPatch {
            important_by: Some(applied.task.important_by.clone()),
            ..TaskPatch::default()
        };
        match self.registry.service().patch_task(id, &patch).await {
            Ok(confirmed) => {
                debug!(task_id = %id, server_updated_at = %confirmed.updated_at, "importance confirmed");
                Ok(applied.task)
            }
            Err(e) => {
                let restored = self.registry.rollback(&applied.snapshot);
                warn!(task_id = %id, restored, error = %e, "importance toggle failed, restored snapshot");
                self.registry.observer().on_mutation_error(id, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Completes the viewer's part of the task, or reopens it if the viewer
    /// already completed it.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::TaskNotFound`] if no feed holds the task, or
    /// [`MutationError::Transport`] after reloading the active category.
    pub async fn toggle_completion(
        &self,
        context: &ViewingContext,
        id: &TaskId,
    ) -> Result<Task, MutationError> {
        let now = (self.clock)();
        let viewer = context.viewer().clone();
        let applied = self.reclassify(context, id, |task| {
            completion::toggle_completion(task, &viewer, now)
        })?;

        let task = &applied.task;
        let patch = TaskPatch {
            status: Some(task.status),
            completed_by: Some(task.completed_by.clone()),
            history: Some(task.history.clone()),
            ..TaskPatch::default()
        };
        self.confirm_reclassifying(&applied, &patch).await?;
        Ok(applied.task)
    }

    /// Sends the task back to its assignee, or hands it to `new_assignee`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::TaskNotFound`] if no feed holds the task, or
    /// [`MutationError::Transport`] after reloading the active category.
    pub async fn reassign(
        &self,
        context: &ViewingContext,
        id: &TaskId,
        new_assignee: Option<UserRef>,
    ) -> Result<Task, MutationError> {
        let now = (self.clock)();
        let actor = context.viewer().clone();
        let applied = self.reclassify(context, id, |task| {
            completion::reassign(task, &actor, new_assignee.as_ref(), now)
        })?;

        let task = &applied.task;
        let patch = TaskPatch {
            status: Some(task.status),
            completed_by: Some(task.completed_by.clone()),
            history: Some(task.history.clone()),
            assignee: new_assignee.map(|_| task.assignee.clone()),
            ..TaskPatch::default()
        };
        self.confirm_reclassifying(&applied, &patch).await?;
        Ok(applied.task)
    }

    /// Creates a task on the service and inserts it into every loaded feed
    /// whose category admits it.
    ///
    /// Nothing is applied locally before the service answers, since the
    /// task id is assigned by the service.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] for invalid fields, or
    /// [`MutationError::Transport`] if the service rejected the task.
    pub async fn create_task(
        &self,
        context: &ViewingContext,
        fields: &NewTask,
    ) -> Result<Task, MutationError> {
        fields.validate()?;
        let task = self
            .registry
            .service()
            .create_task(fields)
            .await
            .inspect_err(|e| warn!(error = %e, title = %fields.title, "task creation failed"))?;
        let now = (self.clock)();
        let inserted: Vec<Category> =
            self.registry
                .insert_created(context, &task, self.membership.as_ref(), now);
        info!(task_id = %task.id, feeds = ?inserted, "task created");
        Ok(task)
    }

    fn reclassify(
        &self,
        context: &ViewingContext,
        id: &TaskId,
        mutate: impl Fn(&Task) -> Task,
    ) -> Result<AppliedMutation, MutationError> {
        let applied = self
            .registry
            .apply_mutation_and_reclassify(context, id, mutate, |task, category| {
                self.membership.still_belongs(task, category, context)
            })
            .ok_or_else(|| MutationError::TaskNotFound(id.clone()))?;
        if !applied.removed_from.is_empty() {
            debug!(task_id = %id, removed_from = ?applied.removed_from, "task reclassified");
        }
        Ok(applied)
    }

    /// Sends `patch` for an applied reclassifying mutation. On failure the
    /// active category is reloaded, unless the viewing context changed while
    /// the patch was in flight.
    async fn confirm_reclassifying(
        &self,
        applied: &AppliedMutation,
        patch: &TaskPatch,
    ) -> Result<(), MutationError> {
        let id = applied.snapshot.task_id();
        match self.registry.service().patch_task(id, patch).await {
            Ok(confirmed) => {
                debug!(task_id = %id, status = %confirmed.status, "mutation confirmed");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "reclassifying mutation failed, reloading active category");
                self.registry.observer().on_mutation_error(id, &e.to_string());
                match self.registry.refresh_after(&applied.snapshot).await {
                    Ok(LoadOutcome::Discarded) => {
                        debug!(task_id = %id, "context changed before failure, reload skipped");
                    }
                    Ok(_) => {}
                    Err(reload) => warn!(error = %reload, "reload after failed mutation also failed"),
                }
                Err(e.into())
            }
        }
    }
}
