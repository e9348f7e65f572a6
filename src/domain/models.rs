use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    Morning,
    Afternoon,
    Evening,
    Future,
    Completed,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Morning,
        Period::Afternoon,
        Period::Evening,
        Period::Future,
        Period::Completed,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            Period::Morning => "MORNING",
            Period::Afternoon => "AFTERNOON",
            Period::Evening => "EVENING",
            Period::Future => "FUTURE",
            Period::Completed => "COMPLETED",
        }
    }

    pub fn from_wire(value: &str) -> Option<Period> {
        match value {
            "MORNING" => Some(Period::Morning),
            "AFTERNOON" => Some(Period::Afternoon),
            "EVENING" => Some(Period::Evening),
            "FUTURE" => Some(Period::Future),
            "COMPLETED" => Some(Period::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl RepeatFrequency {
    pub fn as_wire(&self) -> &'static str {
        match self {
            RepeatFrequency::Daily => "daily",
            RepeatFrequency::Weekly => "weekly",
            RepeatFrequency::Monthly => "monthly",
        }
    }

    pub fn from_wire(value: &str) -> Option<RepeatFrequency> {
        match value {
            "daily" => Some(RepeatFrequency::Daily),
            "weekly" => Some(RepeatFrequency::Weekly),
            "monthly" => Some(RepeatFrequency::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepeatRule {
    pub frequency: RepeatFrequency,
    pub interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub is_priority: bool,
    pub period: Period,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: i64,
    pub updated_at: i64,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub is_priority: bool,
    pub period: Option<Period>,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_minutes: Option<u32>,
    pub repeat: Option<RepeatRule>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..NewTask::default()
        }
    }
}

/// Partial update. An outer `None` leaves the field unchanged; for the
/// clearable fields `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub is_priority: Option<bool>,
    pub period: Option<Period>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub reminder_minutes: Option<Option<u32>>,
    pub repeat: Option<Option<RepeatRule>>,
    pub notes: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskUpdate {
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(is_priority) = self.is_priority {
            task.is_priority = is_priority;
        }
        if let Some(period) = self.period {
            task.period = period;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(reminder_minutes) = self.reminder_minutes {
            task.reminder_minutes = reminder_minutes;
        }
        if let Some(repeat) = self.repeat {
            task.repeat = repeat;
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(category) = &self.category {
            task.category = category.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TasksByPeriod {
    pub morning: Vec<Task>,
    pub afternoon: Vec<Task>,
    pub evening: Vec<Task>,
    pub future: Vec<Task>,
    pub completed: Vec<Task>,
}

impl TasksByPeriod {
    pub fn bucket(&self, period: Period) -> &[Task] {
        match period {
            Period::Morning => &self.morning,
            Period::Afternoon => &self.afternoon,
            Period::Evening => &self.evening,
            Period::Future => &self.future,
            Period::Completed => &self.completed,
        }
    }

    pub fn bucket_mut(&mut self, period: Period) -> &mut Vec<Task> {
        match period {
            Period::Morning => &mut self.morning,
            Period::Afternoon => &mut self.afternoon,
            Period::Evening => &mut self.evening,
            Period::Future => &mut self.future,
            Period::Completed => &mut self.completed,
        }
    }

    pub fn insert(&mut self, period: Period, task: Task) {
        self.bucket_mut(period).push(task);
    }

    pub fn remove(&mut self, period: Period, task_id: &str) -> Option<Task> {
        let bucket = self.bucket_mut(period);
        let index = bucket.iter().position(|task| task.id == task_id)?;
        Some(bucket.remove(index))
    }

    pub fn find(&self, task_id: &str) -> Option<(Period, &Task)> {
        for period in Period::ALL {
            if let Some(task) = self.bucket(period).iter().find(|task| task.id == task_id) {
                return Some((period, task));
            }
        }
        None
    }

    pub fn total(&self) -> usize {
        Period::ALL
            .iter()
            .map(|period| self.bucket(*period).len())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub tasks: TasksByPeriod,
    pub loading: bool,
    pub last_error: Option<String>,
}
