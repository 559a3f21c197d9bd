//! Typed cache keys and key patterns.
//!
//! Keys are only built through the constructors on [`CacheKey`] and
//! [`KeyPattern`]; the store prepends the configured namespace. The key
//! formats below are stable and shared with other services reading the same
//! cache:
//!
//! | Builder | Key (before namespacing) |
//! |---------|--------------------------|
//! | [`CacheKey::auth_token`] | `auth:token:{64 hex sha256}` |
//! | [`CacheKey::ownership`] | `ownership:{resource_id}:{caller_id}` |
//! | [`CacheKey::lock`] | `locks:{domain}:{resource_id}` |
//! | [`CacheKey::scoped`] | `{scope}:{id}` |
//!
//! Constructors never fail; [`CacheKey::validate`] is applied by the store on
//! every operation, so a key built from bad input is rejected there without
//! touching the backend.

use std::fmt;

use thiserror::Error;

/// Longest accepted key, excluding the namespace prefix.
pub const MAX_KEY_LEN: usize = 200;

/// Number of digest characters kept when an auth key is displayed.
const DIGEST_DISPLAY_LEN: usize = 8;

const AUTH_TOKEN_PREFIX: &str = "auth:token:";

/// Why a key or pattern was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyError {
    /// The key is empty.
    #[error("cache key is empty")]
    Empty,

    /// The key exceeds [`MAX_KEY_LEN`].
    #[error("cache key is {len} bytes long, limit is {MAX_KEY_LEN}")]
    TooLong {
        /// Length of the rejected key.
        len: usize,
    },

    /// The key contains a byte outside `[A-Za-z0-9_:.-]`.
    #[error("cache key contains a disallowed character at byte {position}")]
    InvalidCharacter {
        /// Byte offset of the first disallowed character.
        position: usize,
    },
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'.' | b'-')
}

fn check(raw: &str) -> Result<(), KeyError> {
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }
    if raw.len() > MAX_KEY_LEN {
        return Err(KeyError::TooLong { len: raw.len() });
    }
    match raw.bytes().position(|b| !is_key_byte(b)) {
        Some(position) => Err(KeyError::InvalidCharacter { position }),
        None => Ok(()),
    }
}

/// A cache key, without its namespace.
///
/// `Display` and `Debug` shorten the digest of [`auth_token`](Self::auth_token)
/// keys so keys can be logged; [`as_str`](Self::as_str) returns the full key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of a cached credential verdict: `auth:token:{hex(digest)}`.
    ///
    /// Takes the SHA-256 digest rather than any string so that a raw
    /// credential cannot end up in a key.
    #[must_use]
    pub fn auth_token(digest: &[u8; 32]) -> Self {
        Self(format!("{AUTH_TOKEN_PREFIX}{}", hex::encode(digest)))
    }

    /// Key of a cached ownership verdict: `ownership:{resource_id}:{caller_id}`.
    #[must_use]
    pub fn ownership(resource_id: &str, caller_id: &str) -> Self {
        Self(format!("ownership:{resource_id}:{caller_id}"))
    }

    /// Key of a distributed lock: `locks:{domain}:{resource_id}`.
    #[must_use]
    pub fn lock(domain: &str, resource_id: &str) -> Self {
        Self(format!("locks:{domain}:{resource_id}"))
    }

    /// General-purpose key: `{scope}:{id}`.
    #[must_use]
    pub fn scoped(scope: &str, id: &str) -> Self {
        Self(format!("{scope}:{id}"))
    }

    /// Checks the character set and length.
    ///
    /// # Errors
    ///
    /// Returns the first rule the key breaks.
    pub fn validate(&self) -> Result<(), KeyError> {
        check(&self.0)
    }

    /// The full key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.strip_prefix(AUTH_TOKEN_PREFIX) {
            Some(digest) => {
                let shown = digest.get(..DIGEST_DISPLAY_LEN).unwrap_or(digest);
                write!(f, "{AUTH_TOKEN_PREFIX}{shown}..")
            },
            None => f.write_str(&self.0),
        }
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

/// A glob pattern over cache keys, matching every key that starts with a
/// fixed literal prefix.
///
/// The literal must satisfy the key character set, which contains no glob
/// metacharacters, so a pattern can never match more than its prefix implies.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    prefix: String,
}

impl KeyPattern {
    /// Every cached ownership verdict for `resource_id`: `ownership:{resource_id}:*`.
    #[must_use]
    pub fn ownership_of_resource(resource_id: &str) -> Self {
        Self { prefix: format!("ownership:{resource_id}:") }
    }

    /// Every lock in `domain`: `locks:{domain}:*`.
    #[must_use]
    pub fn locks_in_domain(domain: &str) -> Self {
        Self { prefix: format!("locks:{domain}:") }
    }

    /// Every cached credential verdict: `auth:token:*`.
    #[must_use]
    pub fn auth_tokens() -> Self {
        Self { prefix: AUTH_TOKEN_PREFIX.to_owned() }
    }

    /// Every key in `scope`: `{scope}:*`.
    #[must_use]
    pub fn scoped(scope: &str) -> Self {
        Self { prefix: format!("{scope}:") }
    }

    /// Checks the literal prefix against the key rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule the prefix breaks.
    pub fn validate(&self) -> Result<(), KeyError> {
        check(&self.prefix)
    }

    /// The literal part of the pattern.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The pattern in glob syntax.
    #[must_use]
    pub fn as_glob(&self) -> String {
        format!("{}*", self.prefix)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*", self.prefix)
    }
}

impl fmt::Debug for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPattern({self})")
    }
}
