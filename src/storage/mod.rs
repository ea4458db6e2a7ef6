//! # Storage Module
//!
//! JSON persistence for the bot:
//!
//! - [`queue_store`] - the per-guild TTS queue document and its single writer task
//! - [`prefs`] - per-user provider preferences

pub mod prefs;
pub mod queue_store;

pub use prefs::JsonStorage;
pub use queue_store::{QueueDocument, QueueStore, StoreError, StoreWriter};
