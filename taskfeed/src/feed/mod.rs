//! Per-category task feeds.
//!
//! A [`CategoryFeed`] holds one page-cursor-advancing, deduplicated set of
//! tasks for a single category. Loading is split into
//! [`begin_load`](CategoryFeed::begin_load) and
//! [`finish_load`](CategoryFeed::finish_load) so the network await happens
//! outside the feed; the [`LoadTicket`] carries the feed epoch so a response
//! for a feed that has since been reset is recognised and dropped.
//!
//! Two counters are kept. The epoch moves when a replacing load *starts*
//! and decides which tickets are still current. The generation moves only
//! when the entry set is actually replaced, and decides whether a mutation
//! snapshot still describes what the feed holds.

pub mod merge;

use std::collections::HashMap;

use taskfeed_proto::category::Category;
use taskfeed_proto::page::Page;
use taskfeed_proto::task::{Task, TaskId};

pub use merge::{merge_append, replace_with};

/// Default number of tasks requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// How a loaded page is combined with the current entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// The entry set becomes exactly the returned page.
    Replace,
    /// Returned entries are merged by id; existing entries win.
    Append,
}

/// Handle for an in-flight page load, returned by [`CategoryFeed::begin_load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    /// Page being requested.
    pub page: u32,
    /// How the result will be applied.
    pub mode: LoadMode,
    /// Page size requested from the service.
    pub page_size: usize,
    epoch: u64,
}

/// Result of applying a page to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    /// Number of tasks the service returned.
    pub returned: usize,
    /// Number of tasks that ended up inserted.
    pub inserted: usize,
    /// Whether another page may exist: `returned >= page_size`. A page
    /// larger than requested is treated as full.
    pub has_more: bool,
}

/// Capture of a feed's entries, used for optimistic rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    entries: HashMap<TaskId, Task>,
    generation: u64,
}

impl FeedSnapshot {
    /// The captured copy of `id`, if the feed held it.
    #[must_use]
    pub fn entry(&self, id: &TaskId) -> Option<&Task> {
        self.entries.get(id)
    }

    /// Feed generation at capture time.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Read-only summary of a feed's pagination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedState {
    pub category: Category,
    pub cursor: u32,
    pub has_more: bool,
    pub len: usize,
    pub loading: bool,
    pub loaded: bool,
}

/// A deduplicated, paginated list of tasks for one category.
#[derive(Debug, Clone)]
pub struct CategoryFeed {
    category: Category,
    entries: HashMap<TaskId, Task>,
    cursor: u32,
    has_more: bool,
    loading: bool,
    /// Set by the first page applied since creation or reset.
    loaded: bool,
    /// Bumped when a replacing load starts and on reset; tickets from
    /// older epochs are stale.
    epoch: u64,
    /// Bumped when a replacing load is applied and on reset.
    generation: u64,
}

impl CategoryFeed {
    /// Creates an empty feed positioned before page 1.
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entries: HashMap::new(),
            cursor: 1,
            has_more: true,
            loading: false,
            loaded: false,
            epoch: 0,
            generation: 0,
        }
    }

    /// The category this feed holds.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Last successfully loaded page (1 before any load, see [`is_loaded`](Self::is_loaded)).
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Whether another page may exist.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a load is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether any page has been applied since creation or the last reset.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.entries.contains_key(id)
    }

    /// Entries ordered by most recently updated first, ties broken by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.entries.values().cloned().collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    #[must_use]
    pub fn state(&self) -> FeedState {
        FeedState {
            category: self.category,
            cursor: self.cursor,
            has_more: self.has_more,
            len: self.entries.len(),
            loading: self.loading,
            loaded: self.loaded,
        }
    }

    /// Marks a load of `page` as in flight and returns its ticket.
    ///
    /// A `Replace` load starts a new epoch, so any load still in flight
    /// from before it is discarded when it lands.
    pub fn begin_load(&mut self, page: u32, mode: LoadMode, page_size: usize) -> LoadTicket {
        if mode == LoadMode::Replace {
            self.epoch += 1;
        }
        self.loading = true;
        LoadTicket {
            page,
            mode,
            page_size,
            epoch: self.epoch,
        }
    }

    /// Returns `true` if `ticket` was issued in the feed's current epoch.
    #[must_use]
    pub const fn accepts(&self, ticket: &LoadTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Applies a successfully fetched page.
    ///
    /// Returns `None`, leaving the feed untouched, if the feed was reset
    /// after the ticket was issued.
    pub fn finish_load(&mut self, ticket: &LoadTicket, page: Page) -> Option<PageSummary> {
        if !self.accepts(ticket) {
            return None;
        }
        let returned = page.returned();
        let inserted = match ticket.mode {
            LoadMode::Replace => {
                self.entries = replace_with(page.tasks);
                self.generation += 1;
                self.entries.len()
            }
            LoadMode::Append => merge_append(&mut self.entries, page.tasks),
        };
        self.cursor = ticket.page;
        self.has_more = returned >= ticket.page_size;
        self.loading = false;
        self.loaded = true;
        Some(PageSummary {
            returned,
            inserted,
            has_more: self.has_more,
        })
    }

    /// Clears the in-flight flag after a failed fetch. Entries, cursor and
    /// `has_more` are left unchanged.
    pub fn abort_load(&mut self, ticket: &LoadTicket) {
        if self.accepts(ticket) {
            self.loading = false;
        }
    }

    /// Inserts or replaces a single entry without touching pagination state.
    pub fn upsert_local(&mut self, task: Task) {
        self.entries.insert(task.id.clone(), task);
    }

    /// Removes a single entry without touching pagination state.
    pub fn remove_local(&mut self, id: &TaskId) -> Option<Task> {
        self.entries.remove(id)
    }

    /// Captures the current entries.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            entries: self.entries.clone(),
            generation: self.generation,
        }
    }

    /// Restores only `id` to its captured pre-image: re-inserted if the
    /// snapshot held it, removed otherwise.
    pub fn restore_entry(&mut self, snapshot: &FeedSnapshot, id: &TaskId) {
        match snapshot.entry(id) {
            Some(task) => self.upsert_local(task.clone()),
            None => {
                self.entries.remove(id);
            }
        }
    }

    /// Drops all entries and rewinds to page 1. In-flight tickets become stale.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 1;
        self.has_more = true;
        self.loading = false;
        self.loaded = false;
        self.epoch += 1;
        self.generation += 1;
    }
}
