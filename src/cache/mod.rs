//! Model shard cache
//!
//! Module structure:
//! - types.rs: ModelShard, CacheEntry, DownloadProgress, format_bytes
//! - store.rs: CacheStore trait, FileStore, MemoryStore
//! - download.rs: sequential shard download with progress reporting
//! - manager.rs: ModelCacheManager

pub mod download;
pub mod manager;
pub mod store;
pub mod types;

pub use download::ProgressCallback;
pub use manager::{ModelCacheManager, CACHE_VERSION, MAX_CACHE_AGE_DAYS};
pub use store::{CacheStore, FileStore, MemoryStore};
pub use types::{format_bytes, CacheEntry, CacheInfo, DownloadProgress, ModelShard};
