//! Pure task-domain types and the daypart classifier.

pub mod models;
pub mod schedule;
