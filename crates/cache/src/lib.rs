//! Namespaced key-value cache and distributed lock for the warden
//! authorization services.
//!
//! [`CacheStore`] wraps a [`StorageBackend`](warden_storage::StorageBackend)
//! with typed keys, JSON payloads with optional gzip compression, and
//! operation statistics. [`DistributedLock`] builds best-effort mutual
//! exclusion on the same store.
//!
//! # Failure Policy
//!
//! Every cache operation fails open toward "miss":
//!
//! | Operation | On backend failure |
//! |-----------|-------------------|
//! | `get` / `mget` | `None` |
//! | `set` / `mset` / `exists` / `expire` | `false` |
//! | `del` / `delete_by_pattern` / `keys` | `0` / empty |
//! | `stats` | backend figures zeroed |
//! | `acquire_lock` / `release_lock` / `is_locked` | `None` / `false` / `false` |
//!
//! Whether a miss matters is for the caller to decide.

#![deny(unsafe_code)]

pub mod codec;
mod config;
mod key;
mod lock;
mod stats;
mod store;

pub use codec::{CodecError, Compress};
pub use config::{
    CacheConfig, DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_LOCK_TTL, DEFAULT_NAMESPACE, DEFAULT_TTL,
};
pub use key::{CacheKey, KeyError, KeyPattern, MAX_KEY_LEN};
pub use lock::{DistributedLock, LockToken};
pub use stats::{CacheMetrics, CacheStats};
pub use store::{CacheStore, SetOptions};
