//! Redis implementation of [`StorageBackend`](warden_storage::StorageBackend).
//!
//! [`RedisBackend`] is the production backing store for the warden
//! authorization cache. It is shared across service instances, which is what
//! makes the cache's distributed lock meaningful.
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a running Redis server.
//! use std::time::Duration;
//! use warden_storage::StorageBackend;
//! use warden_storage_redis::{RedisBackend, RedisBackendConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisBackendConfig::builder().url("redis://localhost:6379/0").build()?;
//!     let backend = RedisBackend::connect(config).await?;
//!
//!     backend.set_with_ttl("greeting", b"hello".to_vec(), Duration::from_secs(60)).await?;
//!     let value = backend.get("greeting").await?;
//!     assert_eq!(value.as_deref(), Some(&b"hello"[..]));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Mapping
//!
//! Driver errors are mapped onto [`StorageError`](warden_storage::StorageError):
//! I/O failures, refused or dropped connections and loading/try-again replies
//! become `Connection`; timeouts become `Timeout`; reply type mismatches
//! become `Serialization`; everything else becomes `Internal`.

#![deny(unsafe_code)]

mod backend;
mod config;
mod error;

pub use backend::RedisBackend;
pub use config::RedisBackendConfig;
pub use error::{RedisStorageError, Result};
