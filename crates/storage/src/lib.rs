//! Backing store abstractions for the warden authorization services.
//!
//! This crate provides the [`StorageBackend`] trait, the contract for the
//! key-value store that backs the authorization cache, and the
//! [`OwnershipRecordStore`](ownership::OwnershipRecordStore) trait through
//! which the ownership guard reaches the authoritative resource records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Guard Layer                           │
//! │     TokenAuthorizationGuard │ ResourceOwnershipGuard        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     warden-cache                            │
//! │   CacheStore (keys, codec, stats) │ DistributedLock         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    warden-storage                           │
//! │                StorageBackend trait                         │
//! │  (get, set_with_ttl, set_if_absent, compare_and_delete, ..) │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│              RedisBackend                    │
//! │   (testing)  │          (warden-storage-redis)              │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use warden_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set_with_ttl("user:123", b"Alice".to_vec(), Duration::from_secs(60)).await?;
//!     let value = backend.get("user:123").await?;
//!     assert_eq!(value.as_deref(), Some(&b"Alice"[..]));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Available Backends
//!
//! | Backend | Use Case | Shared across processes |
//! |---------|----------|-------------------------|
//! | [`MemoryBackend`] | Testing, development | No |
//! | `RedisBackend` (in `warden-storage-redis`) | Production | Yes |
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends map their internal
//! errors to [`StorageError`]; whether a given error is tolerated (cache) or
//! fatal (ownership store) is decided by the caller.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fault-injecting backends, recording stores
//!   and assertion macros, and the `conformance` suite every backend must pass. Enable this in
//!   `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Activates `fail` crate injection points inside [`MemoryBackend`].

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
pub mod ownership;
pub mod pattern;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use types::BackendInfo;
