//! Key/value cache storage and compaction.

mod kv_cache;

pub use kv_cache::{F16KvCache, KvCache, KvCacheConfig, KvCacheError, KvElement, LayeredKvCache};
