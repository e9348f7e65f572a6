use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use serde_json::Value;
use url::Url;

use crate::infrastructure::error::ConfigError;
use crate::infrastructure::task_cache::DEFAULT_TTL_MINUTES;

const DAYPART_JSON: &str = "daypart.json";
const DEFAULT_COLLECTION: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaypartConfig {
    pub timezone: Tz,
    pub cache_ttl_minutes: i64,
    pub store_base_url: Option<Url>,
    pub store_collection: String,
}

impl Default for DaypartConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            cache_ttl_minutes: DEFAULT_TTL_MINUTES,
            store_base_url: None,
            store_collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

fn default_config_value() -> Value {
    serde_json::json!({
        "schema": 1,
        "timezone": "UTC",
        "cacheTtlMinutes": DEFAULT_TTL_MINUTES,
        "store": { "baseUrl": null, "collection": DEFAULT_COLLECTION }
    })
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), ConfigError> {
    let path = config_dir.join(DAYPART_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_config_value())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| ConfigError::Invalid(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(ConfigError::Invalid(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<DaypartConfig, ConfigError> {
    let parsed = read_config(&config_dir.join(DAYPART_JSON))?;

    let timezone = match parsed
        .get("timezone")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{name}'")))?,
        None => chrono_tz::UTC,
    };

    let cache_ttl_minutes = match parsed.get("cacheTtlMinutes") {
        None | Some(Value::Null) => DEFAULT_TTL_MINUTES,
        Some(value) => {
            let minutes = value.as_i64().ok_or_else(|| {
                ConfigError::Invalid("cacheTtlMinutes must be a number".to_string())
            })?;
            if minutes < 1 {
                return Err(ConfigError::Invalid(
                    "cacheTtlMinutes must be >= 1".to_string(),
                ));
            }
            minutes
        }
    };

    let store = parsed.get("store");
    let store_base_url = match store.and_then(|value| value.get("baseUrl")) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let raw = value.as_str().ok_or_else(|| {
                ConfigError::Invalid("store.baseUrl must be a string".to_string())
            })?;
            let url = Url::parse(raw.trim()).map_err(|error| {
                ConfigError::Invalid(format!("invalid store.baseUrl '{raw}': {error}"))
            })?;
            Some(url)
        }
    };

    let store_collection = store
        .and_then(|value| value.get("collection"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_COLLECTION)
        .to_string();

    Ok(DaypartConfig {
        timezone,
        cache_ttl_minutes,
        store_base_url,
        store_collection,
    })
}
