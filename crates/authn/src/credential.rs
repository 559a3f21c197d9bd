//! Bearer credential extraction and hashing.
//!
//! The raw credential is held in zeroizing memory and never printed. Anything
//! that needs to refer to a credential outside this module (cache keys, log
//! fields) uses its SHA-256 digest.

use std::fmt;

use http::{HeaderMap, header::AUTHORIZATION};
use sha2::{Digest, Sha256};
use warden_cache::CacheKey;
use zeroize::Zeroizing;

use crate::error::AuthError;

/// Number of hex characters of the digest exposed in log fields.
const FINGERPRINT_LEN: usize = 8;

/// An opaque bearer credential.
///
/// `Debug` is redacted and there is no `Display`.
#[derive(Clone)]
pub struct Credential {
    raw: Zeroizing<String>,
}

impl Credential {
    /// Wraps a raw credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] if `raw` is empty or contains
    /// anything other than visible ASCII.
    pub fn new(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = Zeroizing::new(raw.into());
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(AuthError::Unauthenticated);
        }
        Ok(Self { raw })
    }

    /// Extracts the bearer credential from a request's `Authorization` header.
    ///
    /// The scheme is matched case-insensitively. A request carrying more than
    /// one `Authorization` header is rejected rather than guessing which one
    /// to use.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] if the header is missing,
    /// repeated, not valid ASCII, uses another scheme, or carries an empty
    /// credential.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let mut values = headers.get_all(AUTHORIZATION).iter();
        let (Some(value), None) = (values.next(), values.next()) else {
            return Err(AuthError::Unauthenticated);
        };

        let value = value.to_str().map_err(|_| AuthError::Unauthenticated)?;
        let (scheme, rest) = value.split_once(' ').ok_or(AuthError::Unauthenticated)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::Unauthenticated);
        }
        Self::new(rest.trim_start_matches(' '))
    }

    /// The raw credential, for forwarding to the verification service only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.raw
    }

    /// SHA-256 digest of the credential.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.raw.as_bytes()).into()
    }

    /// Cache key under which the verified subject is stored.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::auth_token(&self.digest())
    }

    /// Short digest prefix, safe to put in log fields.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hex = hex::encode(self.digest());
        hex.truncate(FINGERPRINT_LEN);
        hex
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}
