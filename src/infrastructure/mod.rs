//! Adapters at the edges: remote document stores, the snapshot cache and
//! its key-value backing, wire codecs, configuration, and errors.

pub mod config;
pub mod document_store;
pub mod error;
pub mod key_value_store;
pub mod rest_store;
pub mod task_cache;
pub mod task_codec;
