use serde::{Deserialize, Serialize};

use crate::domain::models::{Period, Task, TasksByPeriod};
use crate::domain::schedule::{NowProvider, system_now_provider};
use crate::infrastructure::error::CacheError;
use crate::infrastructure::key_value_store::KeyValueStore;

pub const SNAPSHOT_KEY: &str = "tasks_by_period_snapshot";
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Best-effort mirror of the full task snapshot. Callers log failures
/// and move on; nothing here is load-bearing for correctness.
pub trait TaskCacheRepository: Send + Sync {
    fn load_snapshot(&self) -> Result<Option<TasksByPeriod>, CacheError>;
    fn store_snapshot(&self, tasks: &TasksByPeriod) -> Result<(), CacheError>;
    fn add_task(&self, period: Period, task: &Task) -> Result<(), CacheError>;
    fn update_task(&self, period: Period, task: &Task) -> Result<(), CacheError>;
    fn remove_task(&self, period: Period, task_id: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CachedSnapshot {
    tasks: TasksByPeriod,
    saved_at_ms: i64,
}

pub struct KeyValueTaskCache<K: KeyValueStore> {
    store: K,
    ttl_minutes: i64,
    now_provider: NowProvider,
}

impl<K: KeyValueStore> KeyValueTaskCache<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            ttl_minutes: DEFAULT_TTL_MINUTES,
            now_provider: system_now_provider(),
        }
    }

    pub fn with_ttl_minutes(mut self, ttl_minutes: i64) -> Self {
        self.ttl_minutes = ttl_minutes;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now_ms(&self) -> i64 {
        (self.now_provider)().timestamp_millis()
    }

    fn load_live(&self) -> Result<Option<CachedSnapshot>, CacheError> {
        let Some(raw) = self.store.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };

        let snapshot: CachedSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::warn!("dropping undecodable task cache entry: {error}");
                self.store.remove(SNAPSHOT_KEY)?;
                return Ok(None);
            }
        };

        let age_ms = self.now_ms() - snapshot.saved_at_ms;
        if age_ms >= self.ttl_minutes * 60_000 {
            self.store.remove(SNAPSHOT_KEY)?;
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    fn store_live(&self, snapshot: &CachedSnapshot) -> Result<(), CacheError> {
        let raw = serde_json::to_string(snapshot)?;
        self.store.set(SNAPSHOT_KEY, &raw)
    }
}

impl<K: KeyValueStore> TaskCacheRepository for KeyValueTaskCache<K> {
    fn load_snapshot(&self) -> Result<Option<TasksByPeriod>, CacheError> {
        Ok(self.load_live()?.map(|snapshot| snapshot.tasks))
    }

    fn store_snapshot(&self, tasks: &TasksByPeriod) -> Result<(), CacheError> {
        self.store_live(&CachedSnapshot {
            tasks: tasks.clone(),
            saved_at_ms: self.now_ms(),
        })
    }

    fn add_task(&self, period: Period, task: &Task) -> Result<(), CacheError> {
        // Mutations never lazily populate the cache; without a live
        // snapshot there is nothing to keep consistent.
        let Some(mut snapshot) = self.load_live()? else {
            return Ok(());
        };
        snapshot.tasks.insert(period, task.clone());
        snapshot.saved_at_ms = self.now_ms();
        self.store_live(&snapshot)
    }

    fn update_task(&self, period: Period, task: &Task) -> Result<(), CacheError> {
        let Some(mut snapshot) = self.load_live()? else {
            return Ok(());
        };
        let bucket = snapshot.tasks.bucket_mut(period);
        match bucket.iter_mut().find(|cached| cached.id == task.id) {
            Some(cached) => *cached = task.clone(),
            None => bucket.push(task.clone()),
        }
        snapshot.saved_at_ms = self.now_ms();
        self.store_live(&snapshot)
    }

    fn remove_task(&self, period: Period, task_id: &str) -> Result<(), CacheError> {
        let Some(mut snapshot) = self.load_live()? else {
            return Ok(());
        };
        snapshot.tasks.remove(period, task_id);
        snapshot.saved_at_ms = self.now_ms();
        self.store_live(&snapshot)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(SNAPSHOT_KEY)
    }
}
