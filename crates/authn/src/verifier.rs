//! Client side of the upstream credential verification service.
//!
//! The service takes `POST {"token": "..."}` and answers
//! `{"valid": bool, "subject": {...}, "expiresAt": "..."}`. The guard only
//! depends on the [`CredentialVerifier`] trait; [`HttpCredentialVerifier`] is
//! the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_storage::ConfigError;

use crate::{config::HttpVerifierConfig, credential::Credential, subject::Subject};

/// Body of a verification response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    /// Whether the service accepted the credential.
    pub valid: bool,
    /// The authenticated subject, present when `valid`.
    #[serde(default)]
    pub subject: Option<Subject>,
    /// When the upstream session ends.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerificationResponse {
    /// An accepting response for `subject`.
    #[must_use]
    pub fn accepted(subject: Subject) -> Self {
        let expires_at = subject.expires_at;
        Self { valid: true, subject: Some(subject), expires_at }
    }

    /// A rejecting response.
    #[must_use]
    pub fn rejected() -> Self {
        Self { valid: false, subject: None, expires_at: None }
    }
}

/// Why a verification call produced no usable response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifierError {
    /// The service could not be reached, timed out, or failed on its side.
    #[error("verification service unavailable: {message}")]
    Unavailable {
        /// Description without the service address.
        message: String,
    },

    /// The service refused the credential at the transport level.
    #[error("credential rejected by verification service")]
    Rejected,

    /// The service answered with something that is not a verification
    /// response.
    #[error("malformed verification response: {message}")]
    Malformed {
        /// What was wrong with the response.
        message: String,
    },
}

/// Verifies credentials against the upstream service.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Sends `credential` to the service and returns its answer.
    ///
    /// A response with `valid: false` is `Ok`; `Err` is reserved for calls
    /// that produced no trustworthy answer.
    async fn verify(&self, credential: &Credential) -> Result<VerificationResponse, VerifierError>;
}

#[derive(Serialize)]
struct VerificationRequest<'a> {
    token: &'a str,
}

/// [`CredentialVerifier`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCredentialVerifier {
    client: Client,
    endpoint: Url,
}

impl HttpCredentialVerifier {
    /// Builds a verifier with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &HttpVerifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid { field: "http_client", reason: e.to_string() })?;
        Self::with_client(client, config)
    }

    /// Builds a verifier sharing an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the endpoint is invalid.
    pub fn with_client(client: Client, config: &HttpVerifierConfig) -> Result<Self, ConfigError> {
        Ok(Self { client, endpoint: config.endpoint_url()? })
    }
}

fn classify_status(status: StatusCode) -> Option<VerifierError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VerifierError::Rejected,
        StatusCode::TOO_MANY_REQUESTS => {
            VerifierError::Unavailable { message: format!("status {status}") }
        },
        s if s.is_server_error() => VerifierError::Unavailable { message: format!("status {s}") },
        s => VerifierError::Malformed { message: format!("unexpected status {s}") },
    })
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    #[tracing::instrument(skip_all, fields(credential = %credential.fingerprint()))]
    async fn verify(&self, credential: &Credential) -> Result<VerificationResponse, VerifierError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&VerificationRequest { token: credential.expose() })
            .send()
            .await
            .map_err(|e| VerifierError::Unavailable { message: e.without_url().to_string() })?;

        if let Some(err) = classify_status(response.status()) {
            tracing::debug!(status = %response.status(), "verification service refused");
            return Err(err);
        }

        response
            .json::<VerificationResponse>()
            .await
            .map_err(|e| VerifierError::Malformed { message: e.without_url().to_string() })
    }
}
