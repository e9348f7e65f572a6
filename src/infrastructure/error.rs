use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid task field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("permission denied by task store (status {status})")]
    Permission { status: u16 },
    #[error("task store rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected task store payload: {0}")]
    Payload(String),
    #[error("task document not found: {0}")]
    NotFound(String),
    #[error("task store backend failure: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        StoreError::Network(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cache SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("composition error: {0}")]
    Composition(String),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}
