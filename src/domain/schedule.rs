use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::models::Period;

/// Injectable clock. Services take one of these instead of reading the
/// system time so tests can pin "now".
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_now_provider() -> NowProvider {
    Arc::new(Utc::now)
}

pub const MORNING_START_HOUR: u32 = 5;
pub const AFTERNOON_START_HOUR: u32 = 12;
pub const EVENING_START_HOUR: u32 = 18;

fn local_day(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

/// True when `instant` falls on a strictly later calendar day than `now`
/// in the given zone. Time-of-day never participates in the comparison.
pub fn is_future_day(instant: DateTime<Utc>, now: DateTime<Utc>, zone: Tz) -> bool {
    local_day(instant, zone) > local_day(now, zone)
}

/// Maps a due date to its schedulable period. Tasks without a due date
/// land in the morning. A due date on a later local day is `Future`;
/// otherwise the local hour decides: [5, 12) morning, [12, 18)
/// afternoon, everything else evening. Completion is not this
/// function's concern.
pub fn classify_period(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>, zone: Tz) -> Period {
    let Some(due) = due_date else {
        return Period::Morning;
    };

    if is_future_day(due, now, zone) {
        return Period::Future;
    }

    let hour = due.with_timezone(&zone).hour();
    if (MORNING_START_HOUR..AFTERNOON_START_HOUR).contains(&hour) {
        Period::Morning
    } else if (AFTERNOON_START_HOUR..EVENING_START_HOUR).contains(&hour) {
        Period::Afternoon
    } else {
        Period::Evening
    }
}
