//! # Warden Authentication
//!
//! Request guards for warden services, backed by the shared cache.
//!
//! This crate provides:
//! - **Token authorization**: bearer credential extraction, upstream
//!   verification, and a subject cache keyed by the credential's SHA-256
//! - **Ownership checks**: "does this caller own this resource" with cached
//!   positive and negative verdicts
//! - **Error taxonomy**: one fixed message per failure category, with HTTP
//!   status mapping
//!
//! ## Failure Behavior
//!
//! | Dependency | On failure |
//! |------------|-----------|
//! | Cache | ignored; the guard asks the source of truth |
//! | Verification service | [`AuthError::ServiceUnavailable`], never cached |
//! | Ownership store | [`AuthError::Internal`] |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::HeaderMap;
//! use warden_authn::{
//!     HttpCredentialVerifier, HttpVerifierConfig, OwnershipGuardConfig, OwnershipPolicy,
//!     ResourceOwnershipGuard, TokenAuthorizationGuard, TokenGuardConfig,
//! };
//! use warden_cache::{CacheConfig, CacheStore};
//! use warden_storage::{MemoryBackend, ownership::MemoryOwnershipStore};
//!
//! # async fn example(headers: HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new()), CacheConfig::default()));
//!
//! let verifier = HttpCredentialVerifier::new(
//!     &HttpVerifierConfig::builder().endpoint("https://auth.internal/verify").build()?,
//! )?;
//! let tokens = TokenAuthorizationGuard::new(
//!     Arc::clone(&cache),
//!     Arc::new(verifier),
//!     TokenGuardConfig::default(),
//! );
//! let owners = ResourceOwnershipGuard::new(
//!     cache,
//!     Arc::new(MemoryOwnershipStore::new()),
//!     OwnershipGuardConfig::default(),
//! );
//!
//! let subject = tokens.authorize(&headers).await?;
//! owners
//!     .verify("8f14e45f-ceea-467a-9575-3a3b2e1d0c9b", &subject.id, OwnershipPolicy::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: Enables [`testutil::MockVerifier`].
//! - **`failpoints`**: Activates `fail` injection points in both guards.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Guard configuration.
pub mod config;
/// Bearer credential extraction and hashing.
pub mod credential;
/// Authorization error types.
pub mod error;
/// Resource ownership guard.
pub mod ownership_guard;
/// Subjects and validated identifiers.
pub mod subject;
/// Shared test utilities (requires `testutil` feature).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
/// Bearer-token guard.
pub mod token_guard;
/// Upstream credential verification.
pub mod verifier;

// Re-export key types for convenience
pub use config::{HttpVerifierConfig, OwnershipGuardConfig, TokenGuardConfig};
pub use credential::Credential;
pub use error::{AuthError, AuthErrorKind, RESOURCE_DENIED_MESSAGE, Result};
pub use ownership_guard::{
    OwnershipCacheRecord, OwnershipGrant, OwnershipPolicy, ResourceOwnershipGuard,
};
pub use subject::{CallerId, ResourceId, Subject};
pub use token_guard::TokenAuthorizationGuard;
pub use verifier::{
    CredentialVerifier, HttpCredentialVerifier, VerificationResponse, VerifierError,
};
