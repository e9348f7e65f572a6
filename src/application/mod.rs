//! Services composing the domain with the store and the cache, plus the
//! session composition root.

pub mod bootstrap;
pub mod task_session;
pub mod task_sync;
