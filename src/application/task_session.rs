use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::warn;

use crate::application::task_sync::{TaskSyncService, normalize_title};
use crate::domain::models::{NewTask, Period, SessionSnapshot, Task, TaskUpdate, TasksByPeriod};
use crate::domain::schedule::{NowProvider, classify_period, system_now_provider};
use crate::infrastructure::document_store::TaskDocumentStore;
use crate::infrastructure::error::{CacheError, StoreError, TaskError};
use crate::infrastructure::task_cache::TaskCacheRepository;

#[derive(Default)]
struct SessionState {
    tasks: TasksByPeriod,
    loading: bool,
    last_error: Option<String>,
}

/// In-memory owner of one user's task buckets. Every mutation awaits the
/// remote write first, then moves the task between buckets and mirrors
/// the change into the cache. The state mutex is never held across an
/// await, so operations interleave and apply in resolution order.
pub struct TaskSession<S: TaskDocumentStore, C: TaskCacheRepository> {
    sync: TaskSyncService<S>,
    cache: Arc<C>,
    user_id: String,
    timezone: Tz,
    now_provider: NowProvider,
    state: Mutex<SessionState>,
}

impl<S: TaskDocumentStore + 'static, C: TaskCacheRepository> TaskSession<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>, user_id: impl Into<String>, timezone: Tz) -> Self {
        Self {
            sync: TaskSyncService::new(store, timezone),
            cache,
            user_id: user_id.into(),
            timezone,
            now_provider: system_now_provider(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Pins one clock for the session and its store gateway.
    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.sync = self.sync.with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>, TaskError> {
        self.state
            .lock()
            .map_err(|error| TaskError::Internal(format!("session state lock poisoned: {error}")))
    }

    fn record_failure(&self, error: StoreError) -> TaskError {
        let error = TaskError::from(error);
        if let Ok(mut state) = self.state.lock() {
            state.last_error = Some(error.to_string());
        }
        error
    }

    fn mirror_cache(result: Result<(), CacheError>) {
        if let Err(error) = result {
            warn!("task cache write failed: {error}");
        }
    }

    /// Loads the bucket map, cache first. A live cached snapshot is
    /// adopted as truth and the remote store is not consulted; on a miss
    /// the store is fetched and the cache repopulated.
    pub async fn refresh_tasks(&self) -> Result<(), TaskError> {
        {
            let mut state = self.lock_state()?;
            state.loading = true;
        }

        let cached = self.cache.load_snapshot().unwrap_or_else(|error| {
            warn!("task cache read failed: {error}");
            None
        });
        if let Some(tasks) = cached {
            let mut state = self.lock_state()?;
            state.tasks = tasks;
            state.loading = false;
            state.last_error = None;
            return Ok(());
        }

        match self.sync.fetch_tasks(&self.user_id).await {
            Ok(tasks) => {
                Self::mirror_cache(self.cache.store_snapshot(&tasks));
                let mut state = self.lock_state()?;
                state.tasks = tasks;
                state.loading = false;
                state.last_error = None;
                Ok(())
            }
            Err(error) => {
                let error = self.record_failure(error);
                if let Ok(mut state) = self.state.lock() {
                    state.loading = false;
                }
                Err(error)
            }
        }
    }

    /// Creates a task owned by this session's user and places it in the
    /// bucket matching the period the gateway settled on.
    pub async fn add_task(&self, mut new: NewTask) -> Result<Task, TaskError> {
        new.user_id = self.user_id.clone();
        let stamp = self.now().timestamp_millis();
        new.created_at = stamp;
        new.updated_at = stamp;

        let task = match self.sync.add_task(new).await {
            Ok(task) => task,
            Err(error) => return Err(self.record_failure(error)),
        };

        {
            let mut state = self.lock_state()?;
            state.tasks.insert(task.period, task.clone());
            state.last_error = None;
        }
        Self::mirror_cache(self.cache.add_task(task.period, &task));
        Ok(task)
    }

    /// Applies a partial update. The remote write is awaited before any
    /// in-memory change; a period change moves the task between buckets
    /// (mirrored as a cache remove plus add), anything else replaces it
    /// in place.
    pub async fn update_task(&self, task_id: &str, updates: &TaskUpdate) -> Result<(), TaskError> {
        let (current_bucket, current) = {
            let state = self.lock_state()?;
            let Some((bucket, task)) = state.tasks.find(task_id) else {
                return Err(TaskError::NotFound(task_id.to_string()));
            };
            (bucket, task.clone())
        };

        let mut merged = current;
        updates.apply_to(&mut merged);
        // The gateway normalizes titles on write; the merged copy must
        // hold the same string the store does.
        merged.title = normalize_title(&merged.title);
        let target = self.target_bucket(current_bucket, &merged, updates);
        if target != Period::Completed {
            merged.period = target;
        }
        merged.updated_at = self.now().timestamp_millis();

        if let Err(error) = self.sync.update_task(task_id, updates).await {
            return Err(self.record_failure(error));
        }

        let previous = {
            let mut state = self.lock_state()?;
            let previous = state.tasks.find(task_id).map(|(bucket, _)| bucket);
            match previous {
                Some(bucket) if bucket == target => {
                    if let Some(slot) = state
                        .tasks
                        .bucket_mut(bucket)
                        .iter_mut()
                        .find(|task| task.id == task_id)
                    {
                        *slot = merged.clone();
                    }
                }
                Some(bucket) => {
                    state.tasks.remove(bucket, task_id);
                    state.tasks.insert(target, merged.clone());
                }
                // A concurrent delete resolved first; nothing left to move.
                None => {}
            }
            state.last_error = None;
            previous
        };

        match previous {
            Some(bucket) if bucket == target => {
                Self::mirror_cache(self.cache.update_task(target, &merged));
            }
            Some(bucket) => {
                Self::mirror_cache(self.cache.remove_task(bucket, task_id));
                Self::mirror_cache(self.cache.add_task(target, &merged));
            }
            None => {}
        }
        Ok(())
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), TaskError> {
        {
            let state = self.lock_state()?;
            if state.tasks.find(task_id).is_none() {
                return Err(TaskError::NotFound(task_id.to_string()));
            }
        }

        if let Err(error) = self.sync.delete_task(task_id).await {
            return Err(self.record_failure(error));
        }

        let removed_from = {
            let mut state = self.lock_state()?;
            let bucket = state.tasks.find(task_id).map(|(bucket, _)| bucket);
            if let Some(bucket) = bucket {
                state.tasks.remove(bucket, task_id);
            }
            state.last_error = None;
            bucket
        };
        if let Some(bucket) = removed_from {
            Self::mirror_cache(self.cache.remove_task(bucket, task_id));
        }
        Ok(())
    }

    /// Flips completion, stamping or clearing `completed_at`, and rides
    /// the ordinary update path for the bucket move.
    pub async fn toggle_task(&self, task_id: &str) -> Result<(), TaskError> {
        let completed = {
            let state = self.lock_state()?;
            let Some((_, task)) = state.tasks.find(task_id) else {
                return Err(TaskError::NotFound(task_id.to_string()));
            };
            task.completed
        };

        let updates = if completed {
            TaskUpdate {
                completed: Some(false),
                completed_at: Some(None),
                ..TaskUpdate::default()
            }
        } else {
            TaskUpdate {
                completed: Some(true),
                completed_at: Some(Some(self.now())),
                ..TaskUpdate::default()
            }
        };
        self.update_task(task_id, &updates).await
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, TaskError> {
        let state = self.lock_state()?;
        Ok(SessionSnapshot {
            tasks: state.tasks.clone(),
            loading: state.loading,
            last_error: state.last_error.clone(),
        })
    }

    /// Bucket an updated task lands in. Completion forces `Completed`;
    /// an explicit period in the update wins over one derived from a
    /// due-date change; leaving `Completed` re-derives from the due date.
    fn target_bucket(&self, current: Period, merged: &Task, updates: &TaskUpdate) -> Period {
        if merged.completed {
            return Period::Completed;
        }
        if let Some(period) = updates.period {
            return period;
        }
        if updates.due_date.is_some() || current == Period::Completed {
            return classify_period(merged.due_date, self.now(), self.timezone);
        }
        current
    }
}
