//! Bearer-token authorization with a shared subject cache.
//!
//! # Flow
//!
//! ```text
//! Authorization: Bearer <credential>
//!         │
//!         ▼
//! ┌────────────────────┐  hit   ┌──────────────┐
//! │ cache              │───────►│ Subject      │
//! │ auth:token:<sha256>│        └──────────────┘
//! └─────────┬──────────┘
//!           │ miss (or cache unavailable)
//!           ▼
//! ┌────────────────────┐ valid  ┌──────────────────────────┐
//! │ verification svc   │───────►│ cache for min(ttl, exp)  │
//! └─────────┬──────────┘        └──────────────────────────┘
//!           │ invalid / unreachable
//!           ▼
//!   AuthenticationFailed / ServiceUnavailable (never cached)
//! ```
//!
//! Only successful verifications are cached, so a credential that was once
//! rejected is re-checked on every request. The raw credential never appears
//! in logs or keys; log fields carry an 8-character digest prefix.

use std::sync::Arc;

use chrono::Utc;
use fail::fail_point;
use http::{HeaderMap, Request};
use tracing::Instrument;
use warden_cache::CacheStore;

use crate::{
    config::TokenGuardConfig,
    credential::Credential,
    error::{AuthError, Result},
    subject::Subject,
    verifier::{CredentialVerifier, VerificationResponse, VerifierError},
};

/// Authenticates requests by bearer token.
///
/// Cheap to share: wrap in an `Arc` and call from any number of tasks.
pub struct TokenAuthorizationGuard {
    cache: Arc<CacheStore>,
    verifier: Arc<dyn CredentialVerifier>,
    config: TokenGuardConfig,
}

impl TokenAuthorizationGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(
        cache: Arc<CacheStore>,
        verifier: Arc<dyn CredentialVerifier>,
        config: TokenGuardConfig,
    ) -> Self {
        Self { cache, verifier, config }
    }

    /// Returns the guard's configuration.
    #[must_use]
    pub fn config(&self) -> &TokenGuardConfig {
        &self.config
    }

    /// Authenticates the credential in `headers`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthenticated`] if no usable bearer credential is present
    /// - [`AuthError::AuthenticationFailed`] if the service rejects it
    /// - [`AuthError::ServiceUnavailable`] if the service cannot answer in time
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Subject> {
        let credential = Credential::from_headers(headers)?;
        self.authorize_credential(&credential).await
    }

    /// Authenticates `request` and attaches the [`Subject`] to its extensions.
    ///
    /// # Errors
    ///
    /// See [`authorize`](Self::authorize). The request is left untouched on
    /// error.
    pub async fn authorize_request<B>(&self, request: &mut Request<B>) -> Result<Subject> {
        let subject = self.authorize(request.headers()).await?;
        request.extensions_mut().insert(subject.clone());
        Ok(subject)
    }

    /// Authenticates an already extracted credential.
    ///
    /// # Errors
    ///
    /// See [`authorize`](Self::authorize).
    pub async fn authorize_credential(&self, credential: &Credential) -> Result<Subject> {
        let span = tracing::debug_span!("authorize", credential = %credential.fingerprint());
        self.authorize_inner(credential).instrument(span).await
    }

    /// Drops the cached subject for `credential`, e.g. after logout.
    ///
    /// Returns `false` if nothing was cached or the cache was unreachable.
    pub async fn invalidate(&self, credential: &Credential) -> bool {
        self.cache.del_one(&credential.cache_key()).await
    }

    async fn authorize_inner(&self, credential: &Credential) -> Result<Subject> {
        let key = credential.cache_key();

        if let Some(subject) = self.cache.get::<Subject>(&key).await {
            if !subject.is_expired_at(Utc::now()) {
                tracing::debug!("subject served from cache");
                return Ok(subject);
            }
            tracing::debug!("cached subject past upstream expiry");
        }

        let response = self.call_verifier(credential).await?;
        let subject = Self::accept(response)?;

        let ttl = self.ttl_for(&subject);
        if self.cache.set(&key, &subject, ttl).await {
            tracing::debug!(ttl_ms = ttl.as_millis() as u64, "subject cached");
        } else {
            tracing::debug!("subject not cached");
        }
        Ok(subject)
    }

    async fn call_verifier(&self, credential: &Credential) -> Result<VerificationResponse> {
        fail_point!("token-guard-before-verify", |_| Err(AuthError::ServiceUnavailable));

        let call = self.verifier.verify(credential);
        match tokio::time::timeout(self.config.upstream_timeout(), call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(VerifierError::Rejected)) => {
                tracing::info!("credential rejected");
                Err(AuthError::AuthenticationFailed)
            },
            Ok(Err(e @ VerifierError::Malformed { .. })) => {
                tracing::warn!(error = %e, "verification service returned an unusable response");
                Err(AuthError::AuthenticationFailed)
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "verification service unavailable");
                Err(AuthError::ServiceUnavailable)
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.upstream_timeout().as_millis() as u64,
                    "verification service timed out"
                );
                Err(AuthError::ServiceUnavailable)
            },
        }
    }

    /// Turns a response into a subject, or rejects it.
    fn accept(response: VerificationResponse) -> Result<Subject> {
        if !response.valid {
            tracing::info!("credential rejected");
            return Err(AuthError::AuthenticationFailed);
        }
        let Some(mut subject) = response.subject.filter(|s| !s.id.is_empty()) else {
            tracing::warn!("verification service accepted a credential without a subject");
            return Err(AuthError::AuthenticationFailed);
        };
        if let Some(expires_at) = response.expires_at {
            subject.expires_at = Some(expires_at);
        }
        if subject.is_expired_at(Utc::now()) {
            tracing::info!("credential already expired upstream");
            return Err(AuthError::AuthenticationFailed);
        }
        Ok(subject)
    }

    /// The configured TTL, cut short by the upstream expiry.
    fn ttl_for(&self, subject: &Subject) -> std::time::Duration {
        let ttl = self.config.cache_ttl();
        match subject.expires_at.and_then(|at| (at - Utc::now()).to_std().ok()) {
            Some(remaining) => ttl.min(remaining),
            None => ttl,
        }
    }
}

impl std::fmt::Debug for TokenAuthorizationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthorizationGuard")
            .field("namespace", &self.cache.namespace())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
