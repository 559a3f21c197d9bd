//! Test doubles for the guards.
//!
//! Feature-gated behind `testutil`.
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use warden_authn::testutil::MockVerifier;
//! ```

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    credential::Credential,
    subject::Subject,
    verifier::{CredentialVerifier, VerificationResponse, VerifierError},
};

/// A scripted [`CredentialVerifier`].
///
/// Credentials without a scripted response are answered with
/// `{"valid": false}`.
#[derive(Default)]
pub struct MockVerifier {
    responses: Mutex<HashMap<String, VerificationResponse>>,
    unavailable: AtomicBool,
    malformed: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicU64,
}

impl MockVerifier {
    /// Creates a verifier that rejects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `subject`.
    pub fn accept(&self, token: &str, subject: Subject) {
        self.respond(token, VerificationResponse::accepted(subject));
    }

    /// Answers `token` with `response`.
    pub fn respond(&self, token: &str, response: VerificationResponse) {
        self.responses.lock().insert(token.to_owned(), response);
    }

    /// Forgets the scripted response for `token`.
    pub fn revoke(&self, token: &str) {
        self.responses.lock().remove(token);
    }

    /// Makes every call fail as unreachable (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes every call return an undecodable response (or recover).
    pub fn set_malformed(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    /// Delays every call by `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of calls received.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for MockVerifier {
    async fn verify(&self, credential: &Credential) -> Result<VerificationResponse, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VerifierError::Unavailable { message: "connection refused".into() });
        }
        if self.malformed.load(Ordering::SeqCst) {
            return Err(VerifierError::Malformed { message: "expected value at line 1".into() });
        }

        let response = self.responses.lock().get(credential.expose()).cloned();
        Ok(response.unwrap_or_else(VerificationResponse::rejected))
    }
}
