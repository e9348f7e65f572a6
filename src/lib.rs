//! Daypart task engine: partitions a user's tasks into time-of-day
//! buckets, keeps them synchronized with a remote document store, and
//! mirrors the bucket map into a TTL'd local snapshot cache.
//!
//! The entry point is [`TaskSession`], composed through
//! [`SessionBuilder`]. The layers underneath it (store gateway,
//! validator/codec, classifier, cache) are public for embedders that
//! need the pieces individually.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use application::bootstrap::{BootstrapResult, SessionBuilder, bootstrap_workspace};
pub use application::task_session::TaskSession;
pub use application::task_sync::{TaskSyncService, UNTITLED_TASK_TITLE};
pub use domain::models::{
    NewTask, Period, RepeatFrequency, RepeatRule, SessionSnapshot, Task, TaskUpdate, TasksByPeriod,
};
pub use domain::schedule::{NowProvider, classify_period, system_now_provider};
pub use infrastructure::config::{DaypartConfig, ensure_default_config, load_config};
pub use infrastructure::document_store::{
    DocumentPatch, FieldPatch, InMemoryTaskDocumentStore, TaskDocument, TaskDocumentStore,
};
pub use infrastructure::error::{
    BootstrapError, CacheError, ConfigError, StoreError, TaskError, ValidationError,
};
pub use infrastructure::key_value_store::{
    InMemoryKeyValueStore, KeyValueStore, SqliteKeyValueStore,
};
pub use infrastructure::rest_store::RestTaskDocumentStore;
pub use infrastructure::task_cache::{KeyValueTaskCache, TaskCacheRepository};
pub use infrastructure::task_codec::{decode_task, encode_task};
