use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::infrastructure::document_store::{
    DocumentPatch, FieldPatch, TaskDocument, TaskDocumentStore,
};
use crate::infrastructure::error::StoreError;

/// Reference REST dialect for the task document store. Documents live
/// under `{base}/{collection}`; partial updates are expressed as
/// `{"set": {field: value}, "delete": [field]}`.
#[derive(Debug, Clone)]
pub struct RestTaskDocumentStore {
    client: Client,
    base_url: Url,
    collection: String,
    bearer_token: Option<String>,
}

impl RestTaskDocumentStore {
    pub fn new(base_url: Url, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            collection: collection.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), StoreError> {
        if value.trim().is_empty() {
            return Err(StoreError::Payload(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn collection_endpoint(&self) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend("store base URL cannot be a base".to_string()))?;
            segments.push(&self.collection);
        }
        Ok(url)
    }

    fn document_endpoint(&self, document_id: &str) -> Result<Url, StoreError> {
        let mut url = self.collection_endpoint()?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend("store base URL cannot be a base".to_string()))?;
            segments.push(document_id);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn http_error(status: StatusCode, body: String, document_id: Option<&str>) -> StoreError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return StoreError::Permission {
                status: status.as_u16(),
            };
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = document_id {
                return StoreError::NotFound(id.to_string());
            }
        }
        StoreError::Rejected {
            status: status.as_u16(),
            body,
        }
    }

    fn patch_body(patch: &DocumentPatch) -> Value {
        let mut set = Map::new();
        let mut delete = Vec::new();
        for (field, change) in patch.fields() {
            match change {
                FieldPatch::Set(value) => {
                    set.insert(field.clone(), value.clone());
                }
                FieldPatch::Delete => delete.push(Value::String(field.clone())),
            }
        }

        let mut body = Map::new();
        if !set.is_empty() {
            body.insert("set".to_string(), Value::Object(set));
        }
        if !delete.is_empty() {
            body.insert("delete".to_string(), Value::Array(delete));
        }
        Value::Object(body)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ListDocumentsResponse {
    documents: Option<Vec<DocumentResource>>,
}

#[derive(Debug, serde::Deserialize)]
struct DocumentResource {
    id: String,
    data: Value,
}

#[derive(Debug, serde::Deserialize)]
struct InsertDocumentResponse {
    id: Option<String>,
}

#[async_trait]
impl TaskDocumentStore for RestTaskDocumentStore {
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<TaskDocument>, StoreError> {
        Self::ensure_non_empty(user_id, "user id")?;

        let endpoint = self.collection_endpoint()?;
        let response = self
            .authorize(self.client.get(endpoint).query(&[("userId", user_id)]))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::http_error(status, body, None));
        }

        let parsed: ListDocumentsResponse = serde_json::from_str(&body).map_err(|error| {
            StoreError::Payload(format!("invalid document list payload: {error}; body={body}"))
        })?;

        Ok(parsed
            .documents
            .unwrap_or_default()
            .into_iter()
            .filter(|document| !document.id.trim().is_empty())
            .map(|document| TaskDocument {
                id: document.id,
                data: document.data,
            })
            .collect())
    }

    async fn insert(&self, data: Value) -> Result<String, StoreError> {
        let endpoint = self.collection_endpoint()?;
        let response = self
            .authorize(self.client.post(endpoint).json(&data))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::http_error(status, body, None));
        }

        let parsed: InsertDocumentResponse = serde_json::from_str(&body).map_err(|error| {
            StoreError::Payload(format!("invalid insert payload: {error}; body={body}"))
        })?;
        parsed
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Payload("insert response did not include id".to_string()))
    }

    async fn patch(&self, document_id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
        Self::ensure_non_empty(document_id, "document id")?;

        let endpoint = self.document_endpoint(document_id)?;
        let response = self
            .authorize(self.client.patch(endpoint).json(&Self::patch_body(patch)))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::http_error(status, body, Some(document_id)));
        }
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        Self::ensure_non_empty(document_id, "document id")?;

        let endpoint = self.document_endpoint(document_id)?;
        let response = self.authorize(self.client.delete(endpoint)).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::http_error(status, body, Some(document_id)));
        }
        Ok(())
    }
}
