use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::domain::models::{Period, RepeatFrequency, RepeatRule, Task};
use crate::infrastructure::error::ValidationError;

/// Decodes one stored task document into a typed `Task`. The document id
/// lives outside the payload and is injected here; the stored `period` is
/// returned verbatim, period drift is the store gateway's concern.
pub fn decode_task(document_id: &str, data: &Value) -> Result<Task, ValidationError> {
    let Some(object) = data.as_object() else {
        return Err(ValidationError::new("task", "expected a JSON object"));
    };

    let title = decode_required_text(object, "title")?;
    let completed = decode_optional_bool(object, "completed")?.unwrap_or(false);
    let is_priority = decode_optional_bool(object, "isPriority")?.unwrap_or(false);

    let period_text = decode_required_text(object, "period")?;
    let Some(period) = Period::from_wire(&period_text) else {
        return Err(ValidationError::new(
            "period",
            format!("unrecognized period '{period_text}'"),
        ));
    };

    let user_id = decode_required_text(object, "userId")?;
    let created_at = decode_required_epoch_ms(object, "createdAt")?;
    let updated_at = decode_required_epoch_ms(object, "updatedAt")?;

    let due_date = decode_optional_instant(object, "dueDate")?;
    let completed_at = decode_optional_instant(object, "completedAt")?;
    let repeat = decode_repeat(object)?;
    let reminder_minutes = decode_reminder_minutes(object)?;
    let notes = decode_optional_text(object, "notes")?;
    let category = decode_optional_text(object, "category")?;
    let description = decode_optional_text(object, "description")?;

    Ok(Task {
        id: document_id.to_string(),
        title,
        completed,
        is_priority,
        period,
        due_date,
        reminder_minutes,
        repeat,
        notes,
        category,
        description,
        completed_at,
        created_at,
        updated_at,
        user_id,
    })
}

/// Canonical write payload for one task. The id is carried by the
/// document, never inside the payload.
pub fn encode_task(task: &Task) -> Value {
    let mut data = Map::new();
    data.insert("title".to_string(), Value::String(task.title.clone()));
    data.insert("completed".to_string(), Value::Bool(task.completed));
    data.insert("isPriority".to_string(), Value::Bool(task.is_priority));
    data.insert(
        "period".to_string(),
        Value::String(task.period.as_wire().to_string()),
    );
    if let Some(due_date) = task.due_date {
        data.insert("dueDate".to_string(), encode_instant(due_date));
    }
    if let Some(reminder_minutes) = task.reminder_minutes {
        data.insert("reminderMinutes".to_string(), Value::from(reminder_minutes));
    }
    if let Some(repeat) = task.repeat {
        data.insert("repeat".to_string(), encode_repeat(repeat));
    }
    if let Some(notes) = &task.notes {
        data.insert("notes".to_string(), Value::String(notes.clone()));
    }
    if let Some(category) = &task.category {
        data.insert("category".to_string(), Value::String(category.clone()));
    }
    if let Some(description) = &task.description {
        data.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(completed_at) = task.completed_at {
        data.insert("completedAt".to_string(), encode_instant(completed_at));
    }
    data.insert("createdAt".to_string(), Value::from(task.created_at));
    data.insert("updatedAt".to_string(), Value::from(task.updated_at));
    data.insert("userId".to_string(), Value::String(task.user_id.clone()));
    Value::Object(data)
}

/// Accepts the instant shapes observed in stored data: an RFC 3339
/// string, a plain `YYYY-MM-DD` date (midnight UTC), an
/// epoch-millisecond number, or a `{seconds, nanoseconds}` object.
pub fn decode_instant(field: &str, raw: &Value) -> Result<DateTime<Utc>, ValidationError> {
    match raw {
        Value::String(text) => decode_instant_text(field, text),
        Value::Number(_) => {
            let millis = decode_epoch_ms(field, raw)?;
            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                ValidationError::new(field, format!("epoch milliseconds {millis} out of range"))
            })
        }
        Value::Object(map) => {
            let Some(seconds_value) = map.get("seconds") else {
                return Err(ValidationError::new(
                    field,
                    "timestamp object missing seconds",
                ));
            };
            let Some(seconds) = seconds_value.as_i64() else {
                return Err(ValidationError::new(
                    field,
                    "timestamp seconds must be a number",
                ));
            };
            let nanoseconds = match map.get("nanoseconds") {
                None | Some(Value::Null) => 0,
                Some(value) => value
                    .as_u64()
                    .and_then(|nanos| u32::try_from(nanos).ok())
                    .ok_or_else(|| {
                        ValidationError::new(
                            field,
                            "timestamp nanoseconds must be a non-negative number",
                        )
                    })?,
            };
            DateTime::from_timestamp(seconds, nanoseconds).ok_or_else(|| {
                ValidationError::new(field, format!("timestamp seconds {seconds} out of range"))
            })
        }
        _ => Err(ValidationError::new(field, "unrecognized instant shape")),
    }
}

pub fn encode_instant(instant: DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn decode_instant_text(field: &str, text: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(ValidationError::new(
        field,
        format!("unrecognized datetime '{text}'"),
    ))
}

pub fn encode_repeat(repeat: RepeatRule) -> Value {
    let mut data = Map::new();
    data.insert(
        "frequency".to_string(),
        Value::String(repeat.frequency.as_wire().to_string()),
    );
    data.insert("interval".to_string(), Value::from(repeat.interval));
    Value::Object(data)
}

fn decode_required_text(object: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    let Some(value) = object.get(field) else {
        return Err(ValidationError::new(field, "missing required field"));
    };
    let Some(text) = value.as_str() else {
        return Err(ValidationError::new(field, "expected a string"));
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn decode_optional_text(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.trim())
            .filter(|trimmed| !trimmed.is_empty())
            .map(ToOwned::to_owned)),
        Some(_) => Err(ValidationError::new(field, "expected a string")),
    }
}

fn decode_optional_bool(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Option<bool>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(ValidationError::new(field, "expected a boolean")),
    }
}

fn decode_optional_instant(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode_instant(field, value).map(Some),
    }
}

fn decode_epoch_ms(field: &str, value: &Value) -> Result<i64, ValidationError> {
    if let Some(millis) = value.as_i64() {
        return Ok(millis);
    }
    if let Some(millis) = value.as_f64() {
        if millis.is_finite() {
            return Ok(millis as i64);
        }
    }
    Err(ValidationError::new(
        field,
        "expected an epoch-millisecond number",
    ))
}

fn decode_required_epoch_ms(object: &Map<String, Value>, field: &str) -> Result<i64, ValidationError> {
    let Some(value) = object.get(field) else {
        return Err(ValidationError::new(field, "missing required field"));
    };
    decode_epoch_ms(field, value)
}

fn decode_reminder_minutes(object: &Map<String, Value>) -> Result<Option<u32>, ValidationError> {
    match object.get("reminderMinutes") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|minutes| u32::try_from(minutes).ok())
            .map(Some)
            .ok_or_else(|| {
                ValidationError::new("reminderMinutes", "expected a non-negative integer")
            }),
    }
}

fn decode_repeat(object: &Map<String, Value>) -> Result<Option<RepeatRule>, ValidationError> {
    let Some(value) = object.get("repeat") else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(repeat) = value.as_object() else {
        return Err(ValidationError::new("repeat", "expected an object"));
    };

    let frequency_text = decode_required_text(repeat, "frequency")
        .map_err(|error| ValidationError::new("repeat.frequency", error.reason))?;
    let Some(frequency) = RepeatFrequency::from_wire(&frequency_text) else {
        return Err(ValidationError::new(
            "repeat.frequency",
            format!("unrecognized frequency '{frequency_text}'"),
        ));
    };

    let interval = match repeat.get("interval") {
        None | Some(Value::Null) => 1,
        Some(value) => value
            .as_u64()
            .and_then(|interval| u32::try_from(interval).ok())
            .filter(|interval| *interval >= 1)
            .ok_or_else(|| ValidationError::new("repeat.interval", "expected a positive integer"))?,
    };

    Ok(Some(RepeatRule {
        frequency,
        interval,
    }))
}
