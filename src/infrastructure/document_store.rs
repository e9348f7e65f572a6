use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::infrastructure::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDocument {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch {
    Set(Value),
    Delete,
}

/// Partial update of one document. A `Delete` entry removes the field
/// from the stored payload; writing a literal null is never correct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    fields: BTreeMap<String, FieldPatch>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), FieldPatch::Set(value));
    }

    pub fn delete(&mut self, field: impl Into<String>) {
        self.fields.insert(field.into(), FieldPatch::Delete);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldPatch> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldPatch)> {
        self.fields.iter()
    }

    pub fn apply_to(&self, object: &mut Map<String, Value>) {
        for (field, change) in &self.fields {
            match change {
                FieldPatch::Set(value) => {
                    object.insert(field.clone(), value.clone());
                }
                FieldPatch::Delete => {
                    object.remove(field);
                }
            }
        }
    }
}

#[async_trait]
pub trait TaskDocumentStore: Send + Sync {
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TaskDocument>, StoreError>;

    async fn insert(&self, data: Value) -> Result<String, StoreError>;

    async fn patch(&self, document_id: &str, patch: &DocumentPatch) -> Result<(), StoreError>;

    async fn delete(&self, document_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryTaskDocumentStore {
    documents: Mutex<HashMap<String, Value>>,
    sequence: AtomicU64,
}

impl InMemoryTaskDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            documents: Mutex::new(documents.into_iter().collect()),
            sequence: AtomicU64::new(0),
        }
    }

    fn lock_documents(&self) -> Result<MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.documents
            .lock()
            .map_err(|error| StoreError::Backend(format!("task store lock poisoned: {error}")))
    }
}

#[async_trait]
impl TaskDocumentStore for InMemoryTaskDocumentStore {
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TaskDocument>, StoreError> {
        let documents = self.lock_documents()?;
        let mut matching: Vec<TaskDocument> = documents
            .iter()
            .filter(|(_, data)| data.get("userId").and_then(Value::as_str) == Some(user_id))
            .map(|(id, data)| TaskDocument {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();
        matching.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matching)
    }

    async fn insert(&self, data: Value) -> Result<String, StoreError> {
        let id = format!("task-{:04}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock_documents()?.insert(id.clone(), data);
        Ok(id)
    }

    async fn patch(&self, document_id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
        let mut documents = self.lock_documents()?;
        let Some(data) = documents.get_mut(document_id) else {
            return Err(StoreError::NotFound(document_id.to_string()));
        };
        let Some(object) = data.as_object_mut() else {
            return Err(StoreError::Payload(format!(
                "document {document_id} payload is not an object"
            )));
        };
        patch.apply_to(object);
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        // Deleting an absent document succeeds, matching the remote store.
        self.lock_documents()?.remove(document_id);
        Ok(())
    }
}
