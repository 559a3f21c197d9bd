//! Verified subjects and the identifiers the ownership guard accepts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Longest accepted caller identifier.
pub const MAX_CALLER_ID_LEN: usize = 128;

/// Length of a hyphenated UUID.
const UUID_HYPHENATED_LEN: usize = 36;

/// Identity established by a successful token verification.
///
/// This is the value cached under the credential's digest and attached to
/// the request. `Debug` omits the attribute values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Stable subject identifier; the caller id for ownership checks.
    pub id: String,
    /// Opaque attributes returned by the verification service.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// When the upstream session ends, if it said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subject {
    /// Creates a subject with no attributes and no expiry.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), attributes: Vec::new(), expires_at: None }
    }

    /// Returns whether the upstream session has ended as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("id", &self.id)
            .field("attributes", &format_args!("[{} redacted]", self.attributes.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A validated caller identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    /// Validates a caller identifier: 1 to 128 characters from
    /// `[A-Za-z0-9_.-]`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] otherwise.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        if raw.is_empty() {
            return Err(AuthError::invalid("caller id must not be empty"));
        }
        if raw.len() > MAX_CALLER_ID_LEN {
            return Err(AuthError::invalid("caller id is too long"));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-')) {
            return Err(AuthError::invalid("caller id contains invalid characters"));
        }
        Ok(Self(raw.to_owned()))
    }

    /// The identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&Subject> for CallerId {
    type Error = AuthError;

    fn try_from(subject: &Subject) -> Result<Self, Self::Error> {
        Self::parse(&subject.id)
    }
}

/// A validated resource identifier, normalized to lowercase hyphenated UUID
/// form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    uuid: Uuid,
    text: String,
}

impl ResourceId {
    /// Parses a hyphenated UUID. Simple, braced, and URN forms are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] if `raw` is not a hyphenated UUID.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        if raw.len() != UUID_HYPHENATED_LEN {
            return Err(AuthError::invalid("resource id must be a UUID"));
        }
        let uuid =
            Uuid::parse_str(raw).map_err(|_| AuthError::invalid("resource id must be a UUID"))?;
        Ok(Self { uuid, text: uuid.hyphenated().to_string() })
    }

    /// The parsed UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Canonical text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Duration;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("user-1")]
    #[case("a")]
    #[case("svc.reporting_v2")]
    fn test_caller_id_accepts(#[case] raw: &str) {
        assert_eq!(CallerId::parse(raw).unwrap().as_str(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("user 1")]
    #[case("user:1")]
    #[case("user*")]
    #[case("ユーザー")]
    fn test_caller_id_rejects(#[case] raw: &str) {
        assert!(matches!(CallerId::parse(raw), Err(AuthError::InvalidInput { .. })));
    }

    #[test]
    fn test_caller_id_length_boundary() {
        assert!(CallerId::parse(&"a".repeat(MAX_CALLER_ID_LEN)).is_ok());
        assert!(CallerId::parse(&"a".repeat(MAX_CALLER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_resource_id_normalizes_case() {
        let id = ResourceId::parse("8F14E45F-CEEA-467A-9575-3A3B2E1D0C9B").unwrap();
        assert_eq!(id.as_str(), "8f14e45f-ceea-467a-9575-3a3b2e1d0c9b");
    }

    #[rstest]
    #[case::simple("8f14e45fceea467a95753a3b2e1d0c9b")]
    #[case::braced("{8f14e45f-ceea-467a-9575-3a3b2e1d0c9b}")]
    #[case::urn("urn:uuid:8f14e45f-ceea-467a-9575-3a3b2e1d0c9b")]
    #[case::garbage("not-a-uuid")]
    #[case::bad_hex("zf14e45f-ceea-467a-9575-3a3b2e1d0c9b")]
    #[case::empty("")]
    fn test_resource_id_rejects(#[case] raw: &str) {
        assert!(matches!(ResourceId::parse(raw), Err(AuthError::InvalidInput { .. })));
    }

    #[test]
    fn test_subject_debug_hides_attributes() {
        let subject = Subject {
            id: "user-1".into(),
            attributes: vec!["secret-scope".into()],
            expires_at: None,
        };
        let debug = format!("{subject:?}");
        assert!(debug.contains("user-1"));
        assert!(!debug.contains("secret-scope"));
    }

    #[test]
    fn test_subject_expiry() {
        let now = Utc::now();
        let mut subject = Subject::new("u");
        assert!(!subject.is_expired_at(now));
        subject.expires_at = Some(now - Duration::seconds(1));
        assert!(subject.is_expired_at(now));
        subject.expires_at = Some(now + Duration::seconds(60));
        assert!(!subject.is_expired_at(now));
    }

    #[test]
    fn test_subject_serde_camel_case() {
        let json = r#"{"id":"u1","attributes":["a"],"expiresAt":"2030-01-01T00:00:00Z"}"#;
        let subject: Subject = serde_json::from_str(json).unwrap();
        assert_eq!(subject.id, "u1");
        assert!(subject.expires_at.is_some());

        let minimal: Subject = serde_json::from_str(r#"{"id":"u2"}"#).unwrap();
        assert!(minimal.attributes.is_empty());
        assert!(!serde_json::to_string(&minimal).unwrap().contains("expiresAt"));
    }
}
