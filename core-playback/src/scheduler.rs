//! # Prefetch Scheduler
//!
//! Keeps a symmetric window of neighbours around the playback cursor warm in
//! the cache.
//!
//! ## Overview
//!
//! On every cursor change the scheduler, inside one critical section:
//! 1. computes the desired window `{c-W..c+W} \ {c}` clipped to the playlist,
//! 2. cancels tracked tasks that fell out of the window (without waiting),
//! 3. spawns a task for every window index that has none, or whose previous
//!    task was cancelled or failed transiently.
//!
//! Each task fetches the first `budget_bytes` of its item through the
//! [`RangeFetcher`]. A semaphore bounds how many transfers run at once and
//! tasks are spawned nearest-first so close neighbours get slots first.
//! Origins that cannot serve ranges are remembered and never retried.

use crate::error::{CacheError, FetchError, PlaybackError, Result};
use crate::fetcher::RangeFetcher;
use crate::playlist::Playlist;
use crate::types::{ByteRange, ResourceId};
use core_async::sync::{watch, CancellationToken, Mutex, Semaphore};
use core_async::task::JoinHandle;
use core_runtime::config::{
    DEFAULT_MAX_CONCURRENT_PREFETCHES, DEFAULT_PREFETCH_BUDGET_BYTES, DEFAULT_PREFETCH_RADIUS,
    MAX_PREFETCH_RADIUS,
};
use core_runtime::events::{CoreEvent, EventBus, PrefetchEvent};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Window shape and fetch limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Neighbours on each side of the cursor.
    pub radius: usize,
    /// Bytes fetched from the start of each neighbour.
    pub budget_bytes: u64,
    /// Transfers allowed to run at once.
    pub max_concurrent: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_PREFETCH_RADIUS,
            budget_bytes: DEFAULT_PREFETCH_BUDGET_BYTES,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PREFETCHES,
        }
    }
}

impl PrefetchConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.radius > MAX_PREFETCH_RADIUS {
            return Err(format!(
                "prefetch radius {} exceeds the maximum of {}",
                self.radius, MAX_PREFETCH_RADIUS
            ));
        }
        if self.budget_bytes == 0 {
            return Err("prefetch budget must be greater than 0".to_string());
        }
        if self.max_concurrent == 0 {
            return Err("max concurrent prefetches must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Lifecycle of a prefetch task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for a fetch slot.
    Pending,
    Running,
    Completed { bytes: u64 },
    Cancelled,
    Failed { message: String, permanent: bool },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// A later window recompute should start a fresh task.
    pub fn needs_respawn(&self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Failed { permanent: false, .. }
        )
    }
}

/// Result of reconciling the tracked tasks with a new cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUpdate {
    pub cursor: usize,
    /// Desired window, ascending.
    pub window: Vec<usize>,
    /// Indices that received a new task, in spawn order.
    pub spawned: Vec<usize>,
    /// Indices whose unfinished task was cancelled, ascending.
    pub cancelled: Vec<usize>,
    /// Window indices whose existing task was kept, ascending.
    pub retained: Vec<usize>,
    /// Window indices skipped because their origin cannot serve ranges.
    pub skipped: Vec<usize>,
}

/// Read-only view of one tracked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub index: usize,
    pub resource_id: ResourceId,
    pub range: ByteRange,
    pub state: TaskState,
}

/// Desired prefetch window for `cursor`, ascending.
pub fn desired_window(cursor: usize, radius: usize, len: usize) -> Vec<usize> {
    if len == 0 || cursor >= len {
        return Vec::new();
    }
    let lo = cursor.saturating_sub(radius);
    let hi = cursor.saturating_add(radius).min(len - 1);
    (lo..=hi).filter(|&i| i != cursor).collect()
}

/// Nearest first; forward before backward at equal distance.
fn spawn_order(cursor: usize, window: &[usize]) -> Vec<usize> {
    let mut order = window.to_vec();
    order.sort_by_key(|&i| (i.abs_diff(cursor), i < cursor));
    order
}

struct PrefetchTask {
    resource: ResourceId,
    range: ByteRange,
    cancel: CancellationToken,
    state: watch::Receiver<TaskState>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchTask {
    fn current_state(&self) -> TaskState {
        self.state.borrow().clone()
    }
}

#[derive(Default)]
struct SchedulerState {
    cursor: Option<usize>,
    tasks: BTreeMap<usize, PrefetchTask>,
    /// Handles of cancelled tasks that may still be unwinding.
    retired: Vec<JoinHandle<()>>,
}

impl SchedulerState {
    fn retire(&mut self, task: PrefetchTask) {
        self.retired.retain(|handle| !handle.is_finished());
        if let Some(handle) = task.handle {
            if !handle.is_finished() {
                self.retired.push(handle);
            }
        }
    }
}

/// Everything a spawned task needs, cloned out of the scheduler.
#[derive(Clone)]
struct TaskContext {
    fetcher: Arc<RangeFetcher>,
    permits: Arc<Semaphore>,
    unsupported: Arc<parking_lot::Mutex<HashSet<ResourceId>>>,
    event_bus: Option<EventBus>,
}

impl TaskContext {
    fn emit(&self, event: PrefetchEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Prefetch(event));
        }
    }
}

/// Owns the cursor and the registry of prefetch tasks.
pub struct PrefetchScheduler {
    playlist: Arc<Playlist>,
    config: PrefetchConfig,
    context: TaskContext,
    state: Mutex<SchedulerState>,
    shutdown_token: CancellationToken,
}

impl PrefetchScheduler {
    pub fn new(
        playlist: Arc<Playlist>,
        fetcher: Arc<RangeFetcher>,
        config: PrefetchConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;

        Ok(Self {
            playlist,
            config,
            context: TaskContext {
                fetcher,
                permits: Arc::new(Semaphore::new(config.max_concurrent)),
                unsupported: Arc::new(parking_lot::Mutex::new(HashSet::new())),
                event_bus: None,
            },
            state: Mutex::new(SchedulerState::default()),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Publish window and task events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.context.event_bus = Some(event_bus);
        self
    }

    pub fn playlist(&self) -> &Arc<Playlist> {
        &self.playlist
    }

    pub fn fetcher(&self) -> &Arc<RangeFetcher> {
        &self.context.fetcher
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    pub async fn cursor(&self) -> Option<usize> {
        self.state.lock().await.cursor
    }

    /// Indices with a tracked task, ascending.
    pub async fn tracked_indices(&self) -> Vec<usize> {
        self.state.lock().await.tasks.keys().copied().collect()
    }

    pub async fn task_state(&self, index: usize) -> Option<TaskState> {
        self.state
            .lock()
            .await
            .tasks
            .get(&index)
            .map(PrefetchTask::current_state)
    }

    pub async fn tasks(&self) -> Vec<TaskSnapshot> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .map(|(index, task)| TaskSnapshot {
                index: *index,
                resource_id: task.resource.clone(),
                range: task.range,
                state: task.current_state(),
            })
            .collect()
    }

    /// Whether `resource` was found not to support range requests.
    pub fn is_unsupported(&self, resource: &ResourceId) -> bool {
        self.context.unsupported.lock().contains(resource)
    }

    /// Move the cursor and reconcile the prefetch window.
    #[instrument(skip(self))]
    pub async fn on_cursor_changed(&self, index: usize) -> Result<WindowUpdate> {
        if !self.playlist.contains_index(index) {
            return Err(PlaybackError::IndexOutOfRange {
                index,
                len: self.playlist.len(),
            });
        }

        let mut state = self.state.lock().await;
        if self.shutdown_token.is_cancelled() {
            return Err(PlaybackError::Internal("scheduler is shut down".to_string()));
        }

        let update = self.reconcile(&mut state, index);
        drop(state);

        info!(
            cursor = update.cursor,
            spawned = update.spawned.len(),
            cancelled = update.cancelled.len(),
            retained = update.retained.len(),
            "Prefetch window updated"
        );
        self.context.emit(PrefetchEvent::WindowChanged {
            cursor: update.cursor,
            window: update.window.clone(),
            spawned: update.spawned.clone(),
            cancelled: update.cancelled.clone(),
        });

        Ok(update)
    }

    /// Cancel all tasks, empty the cache in place and resume prefetching for
    /// the current cursor.
    ///
    /// Prefetching resumes even if the storage engine fails to delete files;
    /// that failure is returned.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let tasks = std::mem::take(&mut state.tasks);
        for (_, task) in tasks {
            task.cancel.cancel();
            state.retire(task);
        }

        let cleared = self.context.fetcher.cache().clear_all().await;

        let resumed = match state.cursor {
            Some(cursor) if !self.shutdown_token.is_cancelled() => {
                Some(self.reconcile(&mut state, cursor))
            }
            _ => None,
        };
        drop(state);

        if let Some(update) = resumed {
            debug!(
                cursor = update.cursor,
                spawned = update.spawned.len(),
                "Prefetch resumed after clear"
            );
            self.context.emit(PrefetchEvent::WindowChanged {
                cursor: update.cursor,
                window: update.window,
                spawned: update.spawned,
                cancelled: update.cancelled,
            });
        }

        cleared.map_err(PlaybackError::from)
    }

    /// Wait until every tracked task has settled.
    pub async fn wait_for_idle(&self) {
        let receivers: Vec<_> = self
            .state
            .lock()
            .await
            .tasks
            .values()
            .map(|task| task.state.clone())
            .collect();

        for mut rx in receivers {
            // A dropped sender means the task is gone.
            let _ = rx.wait_for(TaskState::is_terminal).await;
        }
    }

    /// Cancel every task and wait for all of them to exit.
    ///
    /// Later cursor changes are rejected.
    pub async fn shutdown(&self) {
        let handles = {
            let mut state = self.state.lock().await;
            self.shutdown_token.cancel();

            let tasks = std::mem::take(&mut state.tasks);
            let mut handles = std::mem::take(&mut state.retired);
            for (_, task) in tasks {
                task.cancel.cancel();
                handles.extend(task.handle);
            }
            handles
        };

        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Prefetch task panicked");
                }
            }
        }
        info!("Prefetch scheduler shut down");
    }

    /// Steps 1-3 of a cursor change. Caller holds the state lock.
    fn reconcile(&self, state: &mut SchedulerState, cursor: usize) -> WindowUpdate {
        let window = desired_window(cursor, self.config.radius, self.playlist.len());
        let mut update = WindowUpdate {
            cursor,
            window: window.clone(),
            ..Default::default()
        };

        let stale: Vec<usize> = state
            .tasks
            .keys()
            .copied()
            .filter(|index| window.binary_search(index).is_err())
            .collect();
        for index in stale {
            if let Some(task) = state.tasks.remove(&index) {
                if task.current_state().is_active() {
                    task.cancel.cancel();
                    update.cancelled.push(index);
                }
                state.retire(task);
            }
        }

        for index in spawn_order(cursor, &window) {
            if let Some(task) = state.tasks.get(&index) {
                if !task.current_state().needs_respawn() {
                    update.retained.push(index);
                    continue;
                }
            }

            let Some(resource) = self.playlist.resource(index).cloned() else {
                continue;
            };
            let range = ByteRange::new(0, self.config.budget_bytes);

            let task = if self.is_unsupported(&resource) {
                update.skipped.push(index);
                settled_task(resource, range)
            } else {
                update.spawned.push(index);
                self.spawn_task(index, resource, range)
            };

            if let Some(previous) = state.tasks.insert(index, task) {
                state.retire(previous);
            }
        }

        update.retained.sort_unstable();
        update.skipped.sort_unstable();
        state.cursor = Some(cursor);
        update
    }

    fn spawn_task(&self, index: usize, resource: ResourceId, range: ByteRange) -> PrefetchTask {
        let cancel = self.shutdown_token.child_token();
        let (state_tx, state_rx) = watch::channel(TaskState::Pending);
        let handle = core_async::spawn(run_task(
            self.context.clone(),
            index,
            resource.clone(),
            range,
            cancel.clone(),
            state_tx,
        ));

        PrefetchTask {
            resource,
            range,
            cancel,
            state: state_rx,
            handle: Some(handle),
        }
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("playlist_len", &self.playlist.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Placeholder for a window index whose origin is known not to serve ranges.
fn settled_task(resource: ResourceId, range: ByteRange) -> PrefetchTask {
    let (_, state) = watch::channel(TaskState::Failed {
        message: "range requests unsupported".to_string(),
        permanent: true,
    });
    PrefetchTask {
        resource,
        range,
        cancel: CancellationToken::new(),
        state,
        handle: None,
    }
}

async fn run_task(
    context: TaskContext,
    index: usize,
    resource: ResourceId,
    range: ByteRange,
    cancel: CancellationToken,
    state: watch::Sender<TaskState>,
) {
    let resource_id = resource.to_string();

    let permit = core_async::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = context.permits.clone().acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        state.send_replace(TaskState::Cancelled);
        context.emit(PrefetchEvent::TaskCancelled { index, resource_id });
        return;
    };

    state.send_replace(TaskState::Running);
    context.emit(PrefetchEvent::TaskStarted {
        index,
        resource_id: resource_id.clone(),
    });

    let result = context
        .fetcher
        .fetch(&resource, range.offset, range.length, &cancel)
        .await;

    match result {
        Ok(bytes) => {
            debug!(index, bytes, "Prefetch completed");
            state.send_replace(TaskState::Completed { bytes });
            context.emit(PrefetchEvent::TaskCompleted {
                index,
                resource_id,
                bytes,
            });
        }
        Err(FetchError::Cancelled) | Err(FetchError::Cache(CacheError::Invalidated)) => {
            debug!(index, "Prefetch cancelled");
            state.send_replace(TaskState::Cancelled);
            context.emit(PrefetchEvent::TaskCancelled { index, resource_id });
        }
        Err(e) => {
            let permanent = e.is_permanent();
            if permanent {
                context.unsupported.lock().insert(resource.clone());
            }
            warn!(
                index,
                url = %redact_url(resource.as_str()),
                error = %e,
                permanent,
                "Prefetch failed"
            );
            let message = e.to_string();
            state.send_replace(TaskState::Failed {
                message: message.clone(),
                permanent,
            });
            context.emit(PrefetchEvent::TaskFailed {
                index,
                resource_id,
                message,
                permanent,
            });
        }
    }
}
