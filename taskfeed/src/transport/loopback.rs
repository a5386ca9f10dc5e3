//! In-process task service for tests and demos.
//!
//! [`LoopbackService`] keeps tasks in memory and evaluates category filters
//! itself, the way the real backend would. Every payload crosses a JSON
//! encode/decode boundary so callers always receive copies. Failures can be
//! injected per operation, and fetches or patches can be held in flight
//! behind a gate to exercise late-arriving responses.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use taskfeed_proto::category::{Category, ViewingContext};
use taskfeed_proto::codec;
use taskfeed_proto::page::{NewTask, Page, PageRequest, TaskPatch};
use taskfeed_proto::task::{HistoryAction, HistoryEntry, Task, TaskId, TaskStatus, UserId};

use super::{TaskService, TransportError};

/// Status code reported for injected failures.
const INJECTED_STATUS: u16 = 503;

#[derive(Debug, Default)]
struct LoopbackState {
    tasks: Vec<Task>,
    fetch_failures: u32,
    patch_failures: u32,
    create_failures: u32,
    fetches: Vec<PageRequest>,
    patches: Vec<(TaskId, TaskPatch)>,
}

/// Holds calls in flight while closed; each release lets one through.
#[derive(Debug)]
struct Gate {
    closed: AtomicBool,
    permits: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }

    async fn pass(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            self.permits
                .acquire()
                .await
                .map_err(|_| TransportError::ConnectionClosed)?
                .forget();
        }
        Ok(())
    }
}

/// In-memory task backend.
pub struct LoopbackService {
    state: Mutex<LoopbackState>,
    /// Service clock; category dates are evaluated against it.
    now: DateTime<Utc>,
    fetch_gate: Gate,
    patch_gate: Gate,
}

impl LoopbackService {
    /// Creates an empty service whose clock reads `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(LoopbackState::default()),
            now,
            fetch_gate: Gate::new(),
            patch_gate: Gate::new(),
        }
    }

    /// Creates a service pre-populated with `tasks`.
    #[must_use]
    pub fn with_tasks(now: DateTime<Utc>, tasks: impl IntoIterator<Item = Task>) -> Self {
        let service = Self::new(now);
        service.state.lock().tasks.extend(tasks);
        service
    }

    /// The service clock.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Stores a task, replacing any task with the same id.
    pub fn insert(&self, task: Task) {
        let mut state = self.state.lock();
        state.tasks.retain(|t| t.id != task.id);
        state.tasks.push(task);
    }

    /// Returns the stored copy of a task.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| &t.id == id).cloned()
    }

    /// Changes a stored task out of band, as another client would.
    /// Returns `false` if the task does not exist.
    pub fn update(&self, id: &TaskId, change: impl FnOnce(&mut Task)) -> bool {
        let mut state = self.state.lock();
        match state.tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                change(task);
                true
            }
            None => false,
        }
    }

    /// Makes the next `fetch_category_page` call fail.
    pub fn fail_next_fetch(&self) {
        self.state.lock().fetch_failures += 1;
    }

    /// Makes the next `patch_task` call fail.
    pub fn fail_next_patch(&self) {
        self.state.lock().patch_failures += 1;
    }

    /// Makes the next `create_task` call fail.
    pub fn fail_next_create(&self) {
        self.state.lock().create_failures += 1;
    }

    /// Holds every subsequent fetch until released with [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.fetch_gate.closed.store(true, Ordering::SeqCst);
    }

    /// Lets `n` held fetches proceed.
    pub fn release_fetches(&self, n: usize) {
        self.fetch_gate.permits.add_permits(n);
    }

    /// Stops holding fetches. Already-held fetches still need a release.
    pub fn open_fetches(&self) {
        self.fetch_gate.closed.store(false, Ordering::SeqCst);
    }

    /// Holds every subsequent patch until released with [`release_patches`](Self::release_patches).
    pub fn hold_patches(&self) {
        self.patch_gate.closed.store(true, Ordering::SeqCst);
    }

    /// Lets `n` held patches proceed.
    pub fn release_patches(&self, n: usize) {
        self.patch_gate.permits.add_permits(n);
    }

    /// Number of page requests received so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches.len()
    }

    /// Page requests received so far, oldest first.
    #[must_use]
    pub fn fetches(&self) -> Vec<PageRequest> {
        self.state.lock().fetches.clone()
    }

    /// Patches received so far, including failed ones.
    #[must_use]
    pub fn patches(&self) -> Vec<(TaskId, TaskPatch)> {
        self.state.lock().patches.clone()
    }

    fn injected() -> TransportError {
        TransportError::Rejected {
            status: INJECTED_STATUS,
            message: "injected failure".to_string(),
        }
    }

    fn page_for(&self, request: &PageRequest) -> Result<Page, TransportError> {
        let today = self.now.date_naive();
        let mut state = self.state.lock();
        state.fetches.push(request.clone());
        if state.fetch_failures > 0 {
            state.fetch_failures -= 1;
            return Err(Self::injected());
        }

        let mut matching: Vec<&Task> = state
            .tasks
            .iter()
            .filter(|task| matches_category(task, request.category, &request.context, today))
            .collect();
        matching.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id)));

        let skip = (request.page.max(1) as usize - 1) * request.page_size;
        let tasks = matching
            .into_iter()
            .skip(skip)
            .take(request.page_size)
            .cloned()
            .collect();
        Ok(Page {
            tasks,
            page_size: request.page_size,
        })
    }
}

/// Whether both parties of `task` are the ones the context is about.
fn involves(task: &Task, context: &ViewingContext) -> bool {
    match context {
        ViewingContext::Personal { viewer } => &task.assignee.id == viewer,
        ViewingContext::Pair { viewer, subject } => {
            (&task.author.id == viewer && &task.assignee.id == subject)
                || (&task.author.id == subject && &task.assignee.id == viewer)
        }
    }
}

fn open_for(task: &Task, viewer: &UserId) -> bool {
    task.status == TaskStatus::Pending && !task.has_completed(viewer)
}

fn authored_for_other(task: &Task, context: &ViewingContext) -> bool {
    let viewer = context.viewer();
    &task.author.id == viewer
        && &task.assignee.id != viewer
        && context.subject().is_none_or(|subject| &task.assignee.id == subject)
}

/// Server-side category predicate.
fn matches_category(task: &Task, category: Category, context: &ViewingContext, today: NaiveDate) -> bool {
    let viewer = context.viewer();
    let due = task.due_at.date_naive();
    match category {
        Category::Today => involves(task, context) && open_for(task, viewer) && due == today,
        Category::Overdue => involves(task, context) && open_for(task, viewer) && due < today,
        Category::Upcoming => involves(task, context) && open_for(task, viewer) && due > today,
        Category::AssignedToOthers => {
            authored_for_other(task, context)
                && task.status == TaskStatus::Pending
                && !task.has_completed(&task.assignee.id)
        }
        Category::NeedsFinishing => {
            authored_for_other(task, context)
                && task.has_completed(&task.assignee.id)
                && !task.has_completed(viewer)
        }
        Category::Workload => involves(task, context),
        Category::Completed => {
            (involves(task, context) || &task.author.id == viewer)
                && task.status == TaskStatus::Completed
        }
    }
}

/// Sends `value` through the JSON codec, as a network hop would.
fn copy_over_wire<T>(value: &T) -> Result<T, TransportError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let bytes = codec::encode(value)?;
    Ok(codec::decode(&bytes)?)
}

impl TaskService for LoopbackService {
    async fn fetch_category_page(&self, request: &PageRequest) -> Result<Page, TransportError> {
        self.fetch_gate.pass().await?;
        let page = self.page_for(request)?;
        debug!(
            category = %request.category,
            context = %request.context,
            page = request.page,
            returned = page.returned(),
            "loopback page served"
        );
        copy_over_wire(&page)
    }

    async fn patch_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, TransportError> {
        self.patch_gate.pass().await?;
        let patch = copy_over_wire(patch)?;
        let stored = {
            let mut state = self.state.lock();
            state.patches.push((id.clone(), patch.clone()));
            if state.patch_failures > 0 {
                state.patch_failures -= 1;
                return Err(Self::injected());
            }
            let task = state
                .tasks
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| TransportError::NotFound(id.clone()))?;
            patch.apply_to(task);
            task.touch(self.now);
            task.clone()
        };
        debug!(task_id = %id, "loopback patch applied");
        copy_over_wire(&stored)
    }

    async fn create_task(&self, fields: &NewTask) -> Result<Task, TransportError> {
        let fields = copy_over_wire(fields)?;
        let task = {
            let mut state = self.state.lock();
            if state.create_failures > 0 {
                state.create_failures -= 1;
                return Err(Self::injected());
            }
            if let Err(e) = fields.validate() {
                return Err(TransportError::Rejected {
                    status: 422,
                    message: e.to_string(),
                });
            }
            let task = Task {
                id: TaskId::new(),
                title: fields.title,
                description: fields.description,
                status: TaskStatus::Pending,
                due_at: fields.due_at,
                priority: fields.priority,
                history: vec![HistoryEntry {
                    user_id: fields.author.id.clone(),
                    action: HistoryAction::Created,
                    at: self.now,
                }],
                author: fields.author,
                assignee: fields.assignee,
                important_by: Vec::new(),
                completed_by: Vec::new(),
                created_at: self.now,
                updated_at: self.now,
            };
            state.tasks.push(task.clone());
            task
        };
        debug!(task_id = %task.id, "loopback task created");
        copy_over_wire(&task)
    }
}
