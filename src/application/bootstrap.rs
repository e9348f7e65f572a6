use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::task_session::TaskSession;
use crate::domain::schedule::{NowProvider, system_now_provider};
use crate::infrastructure::config::{DaypartConfig, ensure_default_config, load_config};
use crate::infrastructure::document_store::InMemoryTaskDocumentStore;
use crate::infrastructure::error::BootstrapError;
use crate::infrastructure::key_value_store::{InMemoryKeyValueStore, SqliteKeyValueStore};
use crate::infrastructure::rest_store::RestTaskDocumentStore;
use crate::infrastructure::task_cache::KeyValueTaskCache;

pub const CACHE_DATABASE: &str = "daypart.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub config: DaypartConfig,
}

/// Prepares the on-disk workspace: directory skeleton, a default config
/// when none exists, and the cache database schema. Safe to call on
/// every launch.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, BootstrapError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(CACHE_DATABASE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_config(&config_dir)?;
    SqliteKeyValueStore::new(&database_path).initialize()?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        database_path,
        config,
    })
}

/// Composition root for a `TaskSession`. One `NowProvider` is threaded
/// through the gateway, the cache, and the session so the whole stack
/// shares a clock.
pub struct SessionBuilder {
    config: DaypartConfig,
    user_id: String,
    bearer_token: Option<String>,
    now_provider: NowProvider,
}

impl SessionBuilder {
    pub fn new(config: DaypartConfig, user_id: impl Into<String>) -> Self {
        Self {
            config,
            user_id: user_id.into(),
            bearer_token: None,
            now_provider: system_now_provider(),
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// REST document store plus the SQLite-backed snapshot cache.
    /// Requires `store.baseUrl` in the config and an initialized cache
    /// database (`bootstrap_workspace` provides both paths).
    pub fn build_remote(
        &self,
        database_path: &Path,
    ) -> Result<
        TaskSession<RestTaskDocumentStore, KeyValueTaskCache<SqliteKeyValueStore>>,
        BootstrapError,
    > {
        let Some(base_url) = self.config.store_base_url.clone() else {
            return Err(BootstrapError::Composition(
                "remote sessions need store.baseUrl in daypart.json".to_string(),
            ));
        };

        let mut store = RestTaskDocumentStore::new(base_url, self.config.store_collection.as_str());
        if let Some(token) = &self.bearer_token {
            store = store.with_bearer_token(token.clone());
        }

        let key_value = SqliteKeyValueStore::new(database_path);
        key_value.initialize()?;
        let cache = KeyValueTaskCache::new(key_value)
            .with_ttl_minutes(self.config.cache_ttl_minutes)
            .with_now_provider(Arc::clone(&self.now_provider));

        Ok(TaskSession::new(
            Arc::new(store),
            Arc::new(cache),
            self.user_id.clone(),
            self.config.timezone,
        )
        .with_now_provider(Arc::clone(&self.now_provider)))
    }

    /// Everything in memory, for tests and previews. No workspace and no
    /// network required.
    pub fn build_in_memory(
        &self,
    ) -> TaskSession<InMemoryTaskDocumentStore, KeyValueTaskCache<InMemoryKeyValueStore>> {
        let cache = KeyValueTaskCache::new(InMemoryKeyValueStore::new())
            .with_ttl_minutes(self.config.cache_ttl_minutes)
            .with_now_provider(Arc::clone(&self.now_provider));

        TaskSession::new(
            Arc::new(InMemoryTaskDocumentStore::new()),
            Arc::new(cache),
            self.user_id.clone(),
            self.config.timezone,
        )
        .with_now_provider(Arc::clone(&self.now_provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewTask;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "daypart-bootstrap-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn bootstrap_creates_the_workspace_skeleton_with_defaults() {
        let workspace = TempWorkspace::new();

        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");

        assert!(workspace.path.join("config/daypart.json").exists());
        assert!(workspace.path.join("logs").is_dir());
        assert!(result.database_path.exists());
        assert_eq!(result.config.timezone, chrono_tz::UTC);
        assert_eq!(result.config.cache_ttl_minutes, 30);
        assert_eq!(result.config.store_collection, "tasks");
        assert!(result.config.store_base_url.is_none());
    }

    #[test]
    fn bootstrap_is_idempotent_and_keeps_an_edited_config() {
        let workspace = TempWorkspace::new();
        bootstrap_workspace(&workspace.path).expect("first bootstrap");

        let config_path = workspace.path.join("config/daypart.json");
        fs::write(
            &config_path,
            serde_json::to_string_pretty(&serde_json::json!({
                "schema": 1,
                "timezone": "America/New_York",
                "cacheTtlMinutes": 5,
                "store": { "baseUrl": "https://tasks.example.com/api", "collection": "tasks" }
            }))
            .expect("serialize config"),
        )
        .expect("rewrite config");

        let result = bootstrap_workspace(&workspace.path).expect("second bootstrap");
        assert_eq!(result.config.timezone, chrono_tz::America::New_York);
        assert_eq!(result.config.cache_ttl_minutes, 5);
        assert!(result.config.store_base_url.is_some());
    }

    #[test]
    fn build_remote_requires_a_store_base_url() {
        let workspace = TempWorkspace::new();
        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");

        let error = SessionBuilder::new(result.config, "user-1")
            .build_remote(&result.database_path)
            .err()
            .expect("default config has no base URL");
        assert!(matches!(error, BootstrapError::Composition(_)));
    }

    #[test]
    fn build_remote_composes_once_a_base_url_is_configured() {
        let workspace = TempWorkspace::new();
        let mut result = bootstrap_workspace(&workspace.path).expect("bootstrap");
        result.config.store_base_url =
            Some(url::Url::parse("https://tasks.example.com/api").expect("valid url"));

        SessionBuilder::new(result.config, "user-1")
            .with_bearer_token("token-1")
            .build_remote(&result.database_path)
            .expect("remote session composes");
    }

    #[tokio::test]
    async fn in_memory_session_is_usable_without_a_workspace() {
        let session = SessionBuilder::new(DaypartConfig::default(), "user-1").build_in_memory();
        session.refresh_tasks().await.expect("refresh");
        let task = session
            .add_task(NewTask::titled("Offline task"))
            .await
            .expect("add");

        let snapshot = session.snapshot().expect("snapshot");
        assert_eq!(snapshot.tasks.morning.len(), 1);
        assert_eq!(snapshot.tasks.morning[0].id, task.id);
    }
}
