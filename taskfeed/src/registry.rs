//! Registry of category feeds for one viewing context.
//!
//! [`FeedRegistry`] owns one [`CategoryFeed`] per activated category and is
//! the only place feeds are mutated. Every operation receives the viewing
//! context explicitly; a context different from the current one tears down
//! all feeds before the operation proceeds.
//!
//! State lives behind a `parking_lot::Mutex` that is only held in
//! synchronous sections. Optimistic mutations therefore complete across all
//! feeds before control returns, while page loads release the lock for the
//! network await and re-validate their context token and feed epoch when
//! the response lands.
//!
//! Work started on behalf of an earlier context (a reload after a failed
//! mutation, a poll tick) carries that context's token and is dropped once
//! the token is stale; it never switches the registry back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use taskfeed_proto::category::{Category, ViewingContext};
use taskfeed_proto::page::PageRequest;
use taskfeed_proto::task::{Task, TaskId};

use crate::feed::{CategoryFeed, DEFAULT_PAGE_SIZE, FeedSnapshot, FeedState, LoadMode, PageSummary};
use crate::observer::{FeedObserver, NoopObserver};
use crate::policy::membership::MembershipPolicy;
use crate::policy::view_filter::pending_view;
use crate::transport::{TaskService, TransportError};

/// Endpoint template used for categories without an explicit entry.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "tasks/{category}";

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/";

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The category is not part of the registry configuration.
    #[error("category {0} is not configured")]
    UnknownCategory(Category),

    /// `load_more` was called for a category that was never activated.
    #[error("category {0} has not been activated")]
    NotActivated(Category),

    /// The endpoint template did not produce a valid URL.
    #[error("invalid endpoint for {category}: {source}")]
    Endpoint {
        /// Category whose endpoint failed to render.
        category: Category,
        /// Underlying parse error.
        source: url::ParseError,
    },

    /// The page fetch failed; the feed kept its previous state.
    #[error("fetch failed: {0}")]
    Transport(#[from] TransportError),
}

/// What happened to a page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was applied to the feed.
    Loaded(PageSummary),
    /// The context or feed changed while the request was in flight.
    Discarded,
    /// Nothing to do: the feed is exhausted, busy, or already active.
    Skipped,
}

/// Static configuration of a registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL endpoint templates are resolved against.
    pub base_url: String,
    /// Number of tasks requested per page.
    pub page_size: usize,
    /// Categories callers may activate.
    pub categories: Vec<Category>,
    /// Per-category endpoint templates with `{category}`, `{viewer}` and
    /// `{subject}` placeholders.
    pub endpoints: HashMap<Category, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            categories: Category::ALL.to_vec(),
            endpoints: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Renders the endpoint for one page of `category` in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Endpoint`] if `base_url` or the rendered
    /// template is not a valid URL.
    pub fn endpoint(
        &self,
        category: Category,
        context: &ViewingContext,
        page: u32,
    ) -> Result<Url, FeedError> {
        let template = self
            .endpoints
            .get(&category)
            .map_or(DEFAULT_ENDPOINT_TEMPLATE, String::as_str);
        let path = template
            .replace("{category}", category.as_str())
            .replace("{viewer}", context.viewer().as_str())
            .replace("{subject}", context.subject().map_or("", |s| s.as_str()));
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join(&path))
            .map_err(|source| FeedError::Endpoint { category, source })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("viewer", context.viewer().as_str());
            if let Some(subject) = context.subject() {
                query.append_pair("subject", subject.as_str());
            }
            query.append_pair("page", &page.to_string());
            query.append_pair("limit", &self.page_size.to_string());
        }
        Ok(url)
    }

    fn allows(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

/// Pre-mutation capture of every feed a mutation touched.
#[derive(Debug, Clone)]
pub struct MutationSnapshot {
    task_id: TaskId,
    token: u64,
    feeds: Vec<(Category, FeedSnapshot)>,
}

impl MutationSnapshot {
    /// The mutated task.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Categories whose feeds held the task before the mutation.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.feeds.iter().map(|(category, _)| *category).collect()
    }

    /// The task as it was before the mutation.
    #[must_use]
    pub fn previous(&self) -> Option<&Task> {
        self.feeds
            .iter()
            .find_map(|(_, snapshot)| snapshot.entry(&self.task_id))
    }
}

/// Result of an optimistic mutation.
#[derive(Debug, Clone)]
pub struct AppliedMutation {
    /// The new task state, taken from the active feed when it holds the task.
    pub task: Task,
    /// Capture used to roll the mutation back.
    pub snapshot: MutationSnapshot,
    /// Feeds the task was removed from by reclassification.
    pub removed_from: Vec<Category>,
}

#[derive(Debug)]
struct RegistryState {
    context: ViewingContext,
    /// Bumped on every context switch; loads from older tokens are stale.
    token: u64,
    feeds: HashMap<Category, CategoryFeed>,
    active: Option<Category>,
}

impl RegistryState {
    fn new(context: ViewingContext) -> Self {
        Self {
            context,
            token: 0,
            feeds: HashMap::new(),
            active: None,
        }
    }

    /// Sorted so results do not depend on hash order.
    fn held_categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.feeds.keys().copied().collect();
        categories.sort();
        categories
    }
}

/// Owns the category feeds for one viewing context.
pub struct FeedRegistry<S> {
    service: Arc<S>,
    config: RegistryConfig,
    observer: Arc<dyn FeedObserver>,
    state: Mutex<RegistryState>,
}

impl<S: TaskService> FeedRegistry<S> {
    /// Creates a registry for `context` that reports nothing.
    pub fn new(context: ViewingContext, service: Arc<S>, config: RegistryConfig) -> Self {
        Self {
            service,
            config,
            observer: Arc::new(NoopObserver),
            state: Mutex::new(RegistryState::new(context)),
        }
    }

    /// Routes error notifications to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The service pages and patches are sent to.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// The configuration this registry was built with.
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn observer(&self) -> &Arc<dyn FeedObserver> {
        &self.observer
    }

    /// The current viewing context.
    pub fn context(&self) -> ViewingContext {
        self.state.lock().context.clone()
    }

    /// The category most recently activated.
    pub fn active(&self) -> Option<Category> {
        self.state.lock().active
    }

    /// Categories with a feed, in display order.
    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().held_categories()
    }

    /// Tears down every feed and adopts `context`.
    ///
    /// Returns `false` without touching anything if `context` is already
    /// current. Loads still in flight for the old context are discarded
    /// when they land.
    pub fn switch_context(&self, context: &ViewingContext) -> bool {
        let mut state = self.state.lock();
        Self::adopt(&mut state, context)
    }

    fn adopt(state: &mut RegistryState, context: &ViewingContext) -> bool {
        if state.context == *context {
            return false;
        }
        info!(from = %state.context, to = %context, feeds = state.feeds.len(), "switching viewing context");
        state.context = context.clone();
        state.token += 1;
        state.feeds.clear();
        state.active = None;
        true
    }

    /// Locks the state, switching to `context` first if needed.
    fn lock_for(&self, context: &ViewingContext) -> MutexGuard<'_, RegistryState> {
        let mut state = self.state.lock();
        Self::adopt(&mut state, context);
        state
    }

    fn check_configured(&self, category: Category) -> Result<(), FeedError> {
        if self.config.allows(category) {
            Ok(())
        } else {
            Err(FeedError::UnknownCategory(category))
        }
    }

    /// Makes `category` the active feed, creating it if needed.
    ///
    /// Page 1 is loaded with [`LoadMode::Replace`] when the feed has never
    /// loaded or when switching back to it from another category.
    /// Activating the category that is already active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::UnknownCategory`] for categories outside the
    /// configuration, or the fetch error if loading page 1 failed.
    pub async fn activate(
        &self,
        context: &ViewingContext,
        category: Category,
    ) -> Result<LoadOutcome, FeedError> {
        self.check_configured(category)?;
        let needs_load = {
            let mut state = self.lock_for(context);
            let previous = state.active.replace(category);
            let feed = state
                .feeds
                .entry(category)
                .or_insert_with(|| CategoryFeed::new(category));
            let pending_first_load = !feed.is_loaded() && !feed.is_loading();
            pending_first_load || previous != Some(category)
        };
        if !needs_load {
            return Ok(LoadOutcome::Skipped);
        }
        self.load_page(category, 1, LoadMode::Replace, None).await
    }

    /// Reloads page 1 of `category` and makes it active.
    ///
    /// # Errors
    ///
    /// Same as [`activate`](Self::activate).
    pub async fn refresh(
        &self,
        context: &ViewingContext,
        category: Category,
    ) -> Result<LoadOutcome, FeedError> {
        self.check_configured(category)?;
        {
            let mut state = self.lock_for(context);
            state.active = Some(category);
            state
                .feeds
                .entry(category)
                .or_insert_with(|| CategoryFeed::new(category));
        }
        self.load_page(category, 1, LoadMode::Replace, None).await
    }

    /// Reloads page 1 of the active category, if any.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if the reload failed.
    pub async fn refresh_active(&self, context: &ViewingContext) -> Result<LoadOutcome, FeedError> {
        let token = self.lock_for(context).token;
        self.refresh_active_in(token).await
    }

    /// Reloads page 1 of the active category if the registry is still in the
    /// context `snapshot` was taken in. Returns [`LoadOutcome::Discarded`]
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if the reload failed.
    pub async fn refresh_after(&self, snapshot: &MutationSnapshot) -> Result<LoadOutcome, FeedError> {
        self.refresh_active_in(snapshot.token).await
    }

    async fn refresh_active_in(&self, token: u64) -> Result<LoadOutcome, FeedError> {
        let active = {
            let state = self.state.lock();
            if state.token != token {
                debug!("context changed, skipping reload");
                return Ok(LoadOutcome::Discarded);
            }
            state.active
        };
        match active {
            Some(category) => {
                self.load_page(category, 1, LoadMode::Replace, Some(token))
                    .await
            }
            None => Ok(LoadOutcome::Skipped),
        }
    }

    /// Loads the page after the feed's cursor and appends it.
    ///
    /// A feed whose first load never succeeded loads page 1 with
    /// [`LoadMode::Replace`] instead. A no-op returning
    /// [`LoadOutcome::Skipped`] when the feed is exhausted or already
    /// loading.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::NotActivated`] if the feed does not exist, or the
    /// fetch error if loading failed.
    pub async fn load_more(
        &self,
        context: &ViewingContext,
        category: Category,
    ) -> Result<LoadOutcome, FeedError> {
        self.check_configured(category)?;
        let (page, mode) = {
            let state = self.lock_for(context);
            let feed = state
                .feeds
                .get(&category)
                .ok_or(FeedError::NotActivated(category))?;
            if !feed.has_more() || feed.is_loading() {
                debug!(%category, has_more = feed.has_more(), "load_more skipped");
                return Ok(LoadOutcome::Skipped);
            }
            if feed.is_loaded() {
                (feed.cursor() + 1, LoadMode::Append)
            } else {
                debug!(%category, "feed never loaded, loading first page");
                (1, LoadMode::Replace)
            }
        };
        self.load_page(category, page, mode, None).await
    }

    /// Fetches one page and applies it. With `expected_token` set, nothing
    /// is requested unless the registry is still in that context.
    async fn load_page(
        &self,
        category: Category,
        page: u32,
        mode: LoadMode,
        expected_token: Option<u64>,
    ) -> Result<LoadOutcome, FeedError> {
        let (request, ticket, token) = {
            let mut state = self.state.lock();
            if expected_token.is_some_and(|expected| expected != state.token) {
                return Ok(LoadOutcome::Discarded);
            }
            let context = state.context.clone();
            let endpoint = self.config.endpoint(category, &context, page)?;
            let token = state.token;
            let feed = state
                .feeds
                .entry(category)
                .or_insert_with(|| CategoryFeed::new(category));
            let ticket = feed.begin_load(page, mode, self.config.page_size);
            let request = PageRequest {
                context,
                category,
                endpoint,
                page,
                page_size: self.config.page_size,
            };
            (request, ticket, token)
        };

        debug!(%category, page, ?mode, endpoint = %request.endpoint, "loading page");
        let result = self.service.fetch_category_page(&request).await;

        let error = {
            let mut state = self.state.lock();
            if state.token != token {
                debug!(%category, page, "discarding response for stale context");
                return Ok(LoadOutcome::Discarded);
            }
            let Some(feed) = state.feeds.get_mut(&category) else {
                return Ok(LoadOutcome::Discarded);
            };
            if !feed.accepts(&ticket) {
                debug!(%category, page, "discarding response for reset feed");
                return Ok(LoadOutcome::Discarded);
            }
            match result {
                Ok(page_data) => {
                    let Some(summary) = feed.finish_load(&ticket, page_data) else {
                        return Ok(LoadOutcome::Discarded);
                    };
                    if summary.returned > ticket.page_size {
                        debug!(
                            %category,
                            page,
                            returned = summary.returned,
                            page_size = ticket.page_size,
                            "service returned more tasks than requested"
                        );
                    }
                    debug!(
                        %category,
                        page,
                        returned = summary.returned,
                        inserted = summary.inserted,
                        has_more = summary.has_more,
                        "page applied"
                    );
                    return Ok(LoadOutcome::Loaded(summary));
                }
                Err(e) => {
                    feed.abort_load(&ticket);
                    e
                }
            }
        };

        warn!(%category, page, error = %error, "page load failed");
        self.observer.on_fetch_error(category, &error.to_string());
        Err(error.into())
    }

    /// Applies `mutate` to every feed copy of `id`.
    ///
    /// Returns `None` if no feed holds the task. The mutation is complete in
    /// every feed before this returns.
    pub fn apply_mutation(
        &self,
        context: &ViewingContext,
        id: &TaskId,
        mutate: impl Fn(&Task) -> Task,
    ) -> Option<AppliedMutation> {
        self.apply_mutation_and_reclassify(context, id, mutate, |_, _| true)
    }

    /// Applies `mutate` to every feed copy of `id`, removing the task from
    /// feeds where `still_belongs` rejects the new state.
    ///
    /// Returns `None` if no feed holds the task.
    pub fn apply_mutation_and_reclassify(
        &self,
        context: &ViewingContext,
        id: &TaskId,
        mutate: impl Fn(&Task) -> Task,
        still_belongs: impl Fn(&Task, Category) -> bool,
    ) -> Option<AppliedMutation> {
        let mut state = self.lock_for(context);
        let token = state.token;
        let active = state.active;
        let mut snapshots = Vec::new();
        let mut removed_from = Vec::new();
        let mut result: Option<Task> = None;

        for category in state.held_categories() {
            let Some(feed) = state.feeds.get_mut(&category) else {
                continue;
            };
            let Some(current) = feed.get(id) else {
                continue;
            };
            let next = mutate(current);
            snapshots.push((category, feed.snapshot()));
            if result.is_none() || active == Some(category) {
                result = Some(next.clone());
            }
            if still_belongs(&next, category) {
                feed.upsert_local(next);
            } else {
                feed.remove_local(id);
                removed_from.push(category);
            }
        }

        let task = result?;
        debug!(
            task_id = %id,
            feeds = snapshots.len(),
            removed = removed_from.len(),
            "mutation applied optimistically"
        );
        Some(AppliedMutation {
            task,
            snapshot: MutationSnapshot {
                task_id: id.clone(),
                token,
                feeds: snapshots,
            },
            removed_from,
        })
    }

    /// Restores the pre-mutation copy of the task in every feed it touched.
    ///
    /// Feeds whose entries were replaced by a reload since the snapshot, or
    /// belonging to a previous context, are left alone. A reload that
    /// started but failed does not count. Returns the number of feeds
    /// restored.
    pub fn rollback(&self, snapshot: &MutationSnapshot) -> usize {
        let mut state = self.state.lock();
        if state.token != snapshot.token {
            return 0;
        }
        let mut restored = 0;
        for (category, feed_snapshot) in &snapshot.feeds {
            let Some(feed) = state.feeds.get_mut(category) else {
                continue;
            };
            if feed.generation() != feed_snapshot.generation() {
                continue;
            }
            feed.restore_entry(feed_snapshot, &snapshot.task_id);
            restored += 1;
        }
        debug!(task_id = %snapshot.task_id, restored, "mutation rolled back");
        restored
    }

    /// Places a freshly created task into every held feed whose category
    /// admits it. Returns the categories it was inserted into.
    pub fn insert_created(
        &self,
        context: &ViewingContext,
        task: &Task,
        policy: &dyn MembershipPolicy,
        now: DateTime<Utc>,
    ) -> Vec<Category> {
        let mut state = self.lock_for(context);
        let context = state.context.clone();
        let mut inserted = Vec::new();
        for category in state.held_categories() {
            if !policy.admits(task, category, &context, now) {
                continue;
            }
            if let Some(feed) = state.feeds.get_mut(&category) {
                feed.upsert_local(task.clone());
                inserted.push(category);
            }
        }
        inserted
    }

    /// The task as held by the first feed containing it.
    pub fn find(&self, id: &TaskId) -> Option<Task> {
        let state = self.state.lock();
        state
            .held_categories()
            .into_iter()
            .find_map(|category| state.feeds.get(&category)?.get(id).cloned())
    }

    /// Categories whose feeds currently hold `id`.
    pub fn holders(&self, id: &TaskId) -> Vec<Category> {
        let state = self.state.lock();
        state
            .held_categories()
            .into_iter()
            .filter(|category| state.feeds.get(category).is_some_and(|feed| feed.contains(id)))
            .collect()
    }

    /// Tasks in a feed, most recently updated first.
    pub fn tasks(&self, category: Category) -> Vec<Task> {
        self.state
            .lock()
            .feeds
            .get(&category)
            .map(CategoryFeed::tasks)
            .unwrap_or_default()
    }

    /// Tasks in a feed that are still pending for the viewer.
    pub fn pending_tasks(&self, category: Category) -> Vec<Task> {
        let state = self.state.lock();
        state.feeds.get(&category).map_or_else(Vec::new, |feed| {
            pending_view(&feed.tasks(), state.context.viewer())
        })
    }

    /// Pagination state of a feed.
    pub fn feed_state(&self, category: Category) -> Option<FeedState> {
        self.state.lock().feeds.get(&category).map(CategoryFeed::state)
    }

    /// Refreshes the active category of the current context every
    /// `interval` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Between ticks the feeds may be stale; this loop is what bounds that
    /// window. A tick follows whatever context is current when it fires
    /// and a context switch during its fetch discards the result. Fetch
    /// failures are reported through the observer and the loop keeps
    /// running.
    pub async fn run_poller(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        // tokio rejects a zero period.
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; feeds were just activated.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let token = self.state.lock().token;
                    if let Err(e) = self.refresh_active_in(token).await {
                        debug!(error = %e, "poll refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("poller stopped");
                        return;
                    }
                }
            }
        }
    }
}
