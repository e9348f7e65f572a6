use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::warn;
use serde_json::Value;

use crate::domain::models::{NewTask, Period, Task, TaskUpdate, TasksByPeriod};
use crate::domain::schedule::{NowProvider, classify_period, system_now_provider};
use crate::infrastructure::document_store::{DocumentPatch, TaskDocumentStore};
use crate::infrastructure::error::StoreError;
use crate::infrastructure::task_codec::{decode_task, encode_instant, encode_repeat, encode_task};

pub const UNTITLED_TASK_TITLE: &str = "untitled task";

/// Remote CRUD for task documents, scoped to one user. Periods are kept
/// consistent with the due date on every path through here: reads spawn
/// detached repair patches for drifted records, writes recompute the
/// period whenever the due date participates.
pub struct TaskSyncService<S: TaskDocumentStore> {
    store: Arc<S>,
    timezone: Tz,
    now_provider: NowProvider,
}

impl<S: TaskDocumentStore + 'static> TaskSyncService<S> {
    pub fn new(store: Arc<S>, timezone: Tz) -> Self {
        Self {
            store,
            timezone,
            now_provider: system_now_provider(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    /// Lists and buckets every task for the user. Documents that fail
    /// validation are logged and skipped; only the query itself can fail.
    pub async fn fetch_tasks(&self, user_id: &str) -> Result<TasksByPeriod, StoreError> {
        let documents = self.store.list_by_user(user_id).await?;
        let now = self.now();
        let mut tasks = TasksByPeriod::default();

        for document in documents {
            let mut task = match decode_task(&document.id, &document.data) {
                Ok(task) => task,
                Err(error) => {
                    warn!("skipping malformed task document {}: {error}", document.id);
                    continue;
                }
            };

            if task.completed {
                tasks.insert(Period::Completed, task);
                continue;
            }

            let computed = classify_period(task.due_date, now, self.timezone);
            if computed != task.period {
                self.spawn_period_repair(task.id.clone(), computed);
                task.period = computed;
            }
            tasks.insert(computed, task);
        }

        Ok(tasks)
    }

    /// Persists a new task and returns it with the store-assigned id. A
    /// due date fixes the period; an explicit period is honored only for
    /// date-less tasks.
    pub async fn add_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let period = match new.due_date {
            Some(due) => classify_period(Some(due), self.now(), self.timezone),
            None => new.period.unwrap_or(Period::Morning),
        };

        let mut task = Task {
            id: String::new(),
            title: normalize_title(&new.title),
            completed: false,
            is_priority: new.is_priority,
            period,
            due_date: new.due_date,
            reminder_minutes: new.reminder_minutes,
            repeat: new.repeat,
            notes: new.notes,
            category: new.category,
            description: new.description,
            completed_at: None,
            created_at: new.created_at,
            updated_at: new.updated_at,
            user_id: new.user_id,
        };

        task.id = self.store.insert(encode_task(&task)).await?;
        Ok(task)
    }

    pub async fn update_task(&self, task_id: &str, updates: &TaskUpdate) -> Result<(), StoreError> {
        let patch = self.build_update_patch(updates);
        self.store.patch(task_id, &patch).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        self.store.delete(task_id).await
    }

    fn build_update_patch(&self, updates: &TaskUpdate) -> DocumentPatch {
        let now = self.now();
        let mut patch = DocumentPatch::new();

        if let Some(title) = &updates.title {
            patch.set("title", Value::String(normalize_title(title)));
        }
        if let Some(completed) = updates.completed {
            patch.set("completed", Value::Bool(completed));
        }
        if let Some(is_priority) = updates.is_priority {
            patch.set("isPriority", Value::Bool(is_priority));
        }

        // A due date participating in the write fixes the period; an
        // explicit period only survives when the due date is untouched.
        match updates.due_date {
            None => {
                if let Some(period) = updates.period {
                    patch.set("period", Value::String(period.as_wire().to_string()));
                }
            }
            Some(None) => {
                patch.delete("dueDate");
                let period = classify_period(None, now, self.timezone);
                patch.set("period", Value::String(period.as_wire().to_string()));
            }
            Some(Some(due)) => {
                patch.set("dueDate", encode_instant(due));
                let period = classify_period(Some(due), now, self.timezone);
                patch.set("period", Value::String(period.as_wire().to_string()));
            }
        }

        match &updates.reminder_minutes {
            None => {}
            Some(None) => patch.delete("reminderMinutes"),
            Some(Some(minutes)) => patch.set("reminderMinutes", Value::from(*minutes)),
        }
        match &updates.repeat {
            None => {}
            Some(None) => patch.delete("repeat"),
            Some(Some(repeat)) => patch.set("repeat", encode_repeat(*repeat)),
        }
        match &updates.notes {
            None => {}
            Some(None) => patch.delete("notes"),
            Some(Some(notes)) => patch.set("notes", Value::String(notes.clone())),
        }
        match &updates.category {
            None => {}
            Some(None) => patch.delete("category"),
            Some(Some(category)) => patch.set("category", Value::String(category.clone())),
        }
        match &updates.description {
            None => {}
            Some(None) => patch.delete("description"),
            Some(Some(description)) => patch.set("description", Value::String(description.clone())),
        }
        match updates.completed_at {
            None => {}
            Some(None) => patch.delete("completedAt"),
            Some(Some(completed_at)) => patch.set("completedAt", encode_instant(completed_at)),
        }

        patch.set("updatedAt", Value::from(now.timestamp_millis()));
        patch
    }

    /// Detached repair for a drifted period. Never awaited by callers;
    /// failures are logged and dropped. The patch carries only the
    /// period, repairs are not user edits and do not bump `updatedAt`.
    fn spawn_period_repair(&self, task_id: String, period: Period) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut patch = DocumentPatch::new();
            patch.set("period", Value::String(period.as_wire().to_string()));
            if let Err(error) = store.patch(&task_id, &patch).await {
                warn!("period repair for task {task_id} failed: {error}");
            }
        });
    }
}

pub(crate) fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        UNTITLED_TASK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::document_store::{FieldPatch, TaskDocument};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    enum FakeListResponse {
        Success(Vec<TaskDocument>),
        NetworkError,
    }

    #[derive(Debug, Default)]
    struct FakeTaskStore {
        list_responses: Mutex<VecDeque<FakeListResponse>>,
        recorded_inserts: Mutex<Vec<Value>>,
        recorded_patches: Mutex<Vec<(String, DocumentPatch)>>,
        recorded_deletes: Mutex<Vec<String>>,
        fail_patches: AtomicBool,
        patch_calls: AtomicUsize,
    }

    impl FakeTaskStore {
        fn with_list_responses(responses: Vec<FakeListResponse>) -> Self {
            Self {
                list_responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn patches(&self) -> Vec<(String, DocumentPatch)> {
            self.recorded_patches
                .lock()
                .expect("patch lock poisoned")
                .clone()
        }

        fn inserts(&self) -> Vec<Value> {
            self.recorded_inserts
                .lock()
                .expect("insert lock poisoned")
                .clone()
        }
    }

    #[async_trait]
    impl TaskDocumentStore for FakeTaskStore {
        async fn list_by_user(&self, _user_id: &str) -> Result<Vec<TaskDocument>, StoreError> {
            let response = self
                .list_responses
                .lock()
                .expect("list response lock poisoned")
                .pop_front()
                .unwrap_or(FakeListResponse::Success(Vec::new()));
            match response {
                FakeListResponse::Success(documents) => Ok(documents),
                FakeListResponse::NetworkError => {
                    Err(StoreError::Network("connection refused".to_string()))
                }
            }
        }

        async fn insert(&self, data: Value) -> Result<String, StoreError> {
            let mut inserts = self.recorded_inserts.lock().expect("insert lock poisoned");
            inserts.push(data);
            Ok(format!("task-{:04}", inserts.len()))
        }

        async fn patch(&self, document_id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
            self.patch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_patches.load(Ordering::SeqCst) {
                return Err(StoreError::Network("connection refused".to_string()));
            }
            self.recorded_patches
                .lock()
                .expect("patch lock poisoned")
                .push((document_id.to_string(), patch.clone()));
            Ok(())
        }

        async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
            self.recorded_deletes
                .lock()
                .expect("delete lock poisoned")
                .push(document_id.to_string());
            Ok(())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn fixed_now() -> DateTime<Utc> {
        fixed_time("2024-06-10T10:00:00Z")
    }

    fn service(store: Arc<FakeTaskStore>) -> TaskSyncService<FakeTaskStore> {
        TaskSyncService::new(store, chrono_tz::UTC)
            .with_now_provider(Arc::new(|| fixed_now()))
    }

    fn sample_document(id: &str, period: &str, due_date: Option<&str>) -> TaskDocument {
        let mut data = json!({
            "title": format!("Task {id}"),
            "completed": false,
            "isPriority": false,
            "period": period,
            "createdAt": 1_717_900_000_000i64,
            "updatedAt": 1_717_900_000_000i64,
            "userId": "user-1"
        });
        if let Some(due) = due_date {
            data["dueDate"] = json!(due);
        }
        TaskDocument {
            id: id.to_string(),
            data,
        }
    }

    async fn drain_detached_tasks() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn fetch_buckets_by_computed_period_and_repairs_drift() {
        let store = Arc::new(FakeTaskStore::with_list_responses(vec![
            FakeListResponse::Success(vec![sample_document(
                "task-1",
                "EVENING",
                Some("2024-06-10T09:00:00Z"),
            )]),
        ]));
        let service = service(Arc::clone(&store));

        let tasks = service.fetch_tasks("user-1").await.expect("fetch");
        assert_eq!(tasks.morning.len(), 1);
        assert_eq!(tasks.morning[0].period, Period::Morning);
        assert!(tasks.evening.is_empty());

        drain_detached_tasks().await;
        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, "task-1");
        assert_eq!(
            patches[0].1.get("period"),
            Some(&FieldPatch::Set(json!("MORNING")))
        );
        // Repairs are not user edits.
        assert!(patches[0].1.get("updatedAt").is_none());
    }

    #[tokio::test]
    async fn fetch_places_completed_tasks_without_repairing_them() {
        let mut document = sample_document("task-1", "MORNING", Some("2024-06-10T09:00:00Z"));
        document.data["completed"] = json!(true);
        document.data["completedAt"] = json!("2024-06-10T09:30:00Z");
        let store = Arc::new(FakeTaskStore::with_list_responses(vec![
            FakeListResponse::Success(vec![document]),
        ]));
        let service = service(Arc::clone(&store));

        let tasks = service.fetch_tasks("user-1").await.expect("fetch");
        assert_eq!(tasks.completed.len(), 1);
        assert!(tasks.morning.is_empty());

        drain_detached_tasks().await;
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn fetch_skips_malformed_documents_and_keeps_the_rest() {
        let broken = TaskDocument {
            id: "task-bad".to_string(),
            data: json!({ "title": "", "period": "MORNING", "userId": "user-1" }),
        };
        let store = Arc::new(FakeTaskStore::with_list_responses(vec![
            FakeListResponse::Success(vec![
                broken,
                sample_document("task-2", "MORNING", None),
            ]),
        ]));
        let service = service(store);

        let tasks = service.fetch_tasks("user-1").await.expect("fetch");
        assert_eq!(tasks.total(), 1);
        assert_eq!(tasks.morning[0].id, "task-2");
    }

    #[tokio::test]
    async fn fetch_propagates_query_failure() {
        let store = Arc::new(FakeTaskStore::with_list_responses(vec![
            FakeListResponse::NetworkError,
        ]));
        let service = service(store);

        let error = service
            .fetch_tasks("user-1")
            .await
            .expect_err("query failure must propagate");
        assert!(matches!(error, StoreError::Network(_)));
    }

    #[tokio::test]
    async fn repair_failures_never_surface_to_the_fetch_caller() {
        let store = Arc::new(FakeTaskStore::with_list_responses(vec![
            FakeListResponse::Success(vec![sample_document(
                "task-1",
                "EVENING",
                Some("2024-06-10T09:00:00Z"),
            )]),
        ]));
        store.fail_patches.store(true, Ordering::SeqCst);
        let service = service(Arc::clone(&store));

        let tasks = service.fetch_tasks("user-1").await.expect("fetch");
        assert_eq!(tasks.morning.len(), 1);

        drain_detached_tasks().await;
        assert!(store.patch_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn add_derives_period_from_due_date_and_coerces_blank_titles() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        let task = service
            .add_task(NewTask {
                title: "   ".to_string(),
                period: Some(Period::Evening),
                due_date: Some(fixed_time("2024-06-10T09:00:00Z")),
                user_id: "user-1".to_string(),
                created_at: 1_718_000_000_000,
                updated_at: 1_718_000_000_000,
                ..NewTask::default()
            })
            .await
            .expect("add");

        assert_eq!(task.id, "task-0001");
        assert_eq!(task.title, UNTITLED_TASK_TITLE);
        assert_eq!(task.period, Period::Morning);

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0]["period"], json!("MORNING"));
        assert_eq!(inserts[0]["title"], json!(UNTITLED_TASK_TITLE));
        assert_eq!(inserts[0]["userId"], json!("user-1"));
        assert!(inserts[0].get("id").is_none());
    }

    #[tokio::test]
    async fn add_honors_explicit_period_only_without_a_due_date() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        let task = service
            .add_task(NewTask {
                title: "Read".to_string(),
                period: Some(Period::Evening),
                user_id: "user-1".to_string(),
                ..NewTask::default()
            })
            .await
            .expect("add");
        assert_eq!(task.period, Period::Evening);

        let task = service
            .add_task(NewTask {
                title: "Untimed".to_string(),
                user_id: "user-1".to_string(),
                ..NewTask::default()
            })
            .await
            .expect("add");
        assert_eq!(task.period, Period::Morning);
    }

    #[tokio::test]
    async fn update_patch_recomputes_period_when_the_due_date_changes() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        service
            .update_task(
                "task-1",
                &TaskUpdate {
                    due_date: Some(Some(fixed_time("2024-06-10T19:00:00Z"))),
                    period: Some(Period::Morning),
                    ..TaskUpdate::default()
                },
            )
            .await
            .expect("update");

        let patches = store.patches();
        let patch = &patches[0].1;
        assert_eq!(
            patch.get("dueDate"),
            Some(&FieldPatch::Set(json!("2024-06-10T19:00:00.000Z")))
        );
        // The due date wins over the explicit period here.
        assert_eq!(patch.get("period"), Some(&FieldPatch::Set(json!("EVENING"))));
        assert_eq!(
            patch.get("updatedAt"),
            Some(&FieldPatch::Set(json!(fixed_now().timestamp_millis())))
        );
    }

    #[tokio::test]
    async fn update_patch_passes_an_explicit_period_through_when_due_is_untouched() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        service
            .update_task(
                "task-1",
                &TaskUpdate {
                    period: Some(Period::Afternoon),
                    ..TaskUpdate::default()
                },
            )
            .await
            .expect("update");

        let patches = store.patches();
        assert_eq!(
            patches[0].1.get("period"),
            Some(&FieldPatch::Set(json!("AFTERNOON")))
        );
        assert!(patches[0].1.get("dueDate").is_none());
    }

    #[tokio::test]
    async fn update_patch_clears_fields_with_delete_markers_not_nulls() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        service
            .update_task(
                "task-1",
                &TaskUpdate {
                    completed: Some(false),
                    completed_at: Some(None),
                    due_date: Some(None),
                    ..TaskUpdate::default()
                },
            )
            .await
            .expect("update");

        let patches = store.patches();
        let patch = &patches[0].1;
        assert_eq!(patch.get("completedAt"), Some(&FieldPatch::Delete));
        assert_eq!(patch.get("dueDate"), Some(&FieldPatch::Delete));
        // A cleared due date re-derives the date-less default.
        assert_eq!(patch.get("period"), Some(&FieldPatch::Set(json!("MORNING"))));
    }

    #[tokio::test]
    async fn delete_forwards_to_the_store() {
        let store = Arc::new(FakeTaskStore::default());
        let service = service(Arc::clone(&store));

        service.delete_task("task-1").await.expect("delete");
        assert_eq!(
            store
                .recorded_deletes
                .lock()
                .expect("delete lock poisoned")
                .as_slice(),
            ["task-1".to_string()]
        );
    }

    // Feature: task sync, Property: a fetched task lands in exactly one
    // bucket, chosen by its due date rather than its stored period
    proptest! {
        #[test]
        fn fetched_tasks_land_in_exactly_one_bucket(
            stored_period in prop::sample::select(vec![
                "MORNING", "AFTERNOON", "EVENING", "FUTURE"
            ]),
            due_hour in 0u32..24u32
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let due = format!("2024-06-10T{due_hour:02}:00:00Z");
                let store = Arc::new(FakeTaskStore::with_list_responses(vec![
                    FakeListResponse::Success(vec![sample_document(
                        "task-1",
                        stored_period,
                        Some(&due),
                    )]),
                ]));
                let service = service(store);

                let tasks = service.fetch_tasks("user-1").await.expect("fetch");
                assert_eq!(tasks.total(), 1);
                let (bucket, task) = tasks.find("task-1").expect("task present");
                assert_eq!(
                    bucket,
                    classify_period(Some(fixed_time(&due)), fixed_now(), chrono_tz::UTC)
                );
                assert_eq!(task.period, bucket);
            });
        }
    }
}
