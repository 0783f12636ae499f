//! Storage Layer
//!
//! Durable cache of generated fragments.

pub mod cache_store;

pub use cache_store::{CacheStore, FileCacheStore, MemoryCacheStore, SharedCache};
