//! Authorization error types.
//!
//! Every variant carries one fixed message. Messages never include the
//! credential, the caller, the resource, or the upstream address, so an
//! error can be returned to the client as-is.

use http::StatusCode;
use thiserror::Error;
use warden_storage::StorageError;

/// Message shared by [`AuthError::ResourceNotFound`] and
/// [`AuthError::Unauthorized`], so a caller cannot tell a missing resource
/// from someone else's.
pub const RESOURCE_DENIED_MESSAGE: &str = "Resource not found or access denied";

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases. Downstream match expressions must include a
/// wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A request parameter is malformed. Nothing was looked up.
    ///
    /// The message is the same for every rule; `reason` is for logs.
    #[error("Invalid input")]
    InvalidInput {
        /// Fixed description of the rule that was violated.
        reason: &'static str,
    },

    /// No usable bearer credential was presented.
    #[error("Authentication required")]
    Unauthenticated,

    /// The verification service did not accept the credential.
    #[error("Invalid or expired credential")]
    AuthenticationFailed,

    /// The verification service could not be reached in time.
    #[error("Authentication service unavailable")]
    ServiceUnavailable,

    /// The resource does not exist (or is deleted).
    #[error("{}", RESOURCE_DENIED_MESSAGE)]
    ResourceNotFound,

    /// The resource exists but the caller may not access it.
    #[error("{}", RESOURCE_DENIED_MESSAGE)]
    Unauthorized,

    /// The ownership store failed.
    ///
    /// The source is kept for logging; the message stays fixed.
    #[error("Internal error")]
    Internal(
        /// The store error that aborted the check.
        #[source]
        StorageError,
    ),
}

/// Error category, for metrics labels and response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AuthErrorKind {
    /// See [`AuthError::InvalidInput`].
    InvalidInput,
    /// See [`AuthError::Unauthenticated`].
    Unauthenticated,
    /// See [`AuthError::AuthenticationFailed`].
    AuthenticationFailed,
    /// See [`AuthError::ServiceUnavailable`].
    ServiceUnavailable,
    /// See [`AuthError::ResourceNotFound`].
    ResourceNotFound,
    /// See [`AuthError::Unauthorized`].
    Unauthorized,
    /// See [`AuthError::Internal`].
    Internal,
}

impl AuthErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unauthenticated => "unauthenticated",
            Self::AuthenticationFailed => "authentication_failed",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ResourceNotFound => "resource_not_found",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
        }
    }
}

impl AuthError {
    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidInput { .. } => AuthErrorKind::InvalidInput,
            Self::Unauthenticated => AuthErrorKind::Unauthenticated,
            Self::AuthenticationFailed => AuthErrorKind::AuthenticationFailed,
            Self::ServiceUnavailable => AuthErrorKind::ServiceUnavailable,
            Self::ResourceNotFound => AuthErrorKind::ResourceNotFound,
            Self::Unauthorized => AuthErrorKind::Unauthorized,
            Self::Internal(_) => AuthErrorKind::Internal,
        }
    }

    /// Returns the HTTP status a request pipeline should answer with.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.kind() {
            AuthErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            AuthErrorKind::Unauthenticated | AuthErrorKind::AuthenticationFailed => {
                StatusCode::UNAUTHORIZED
            },
            AuthErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthErrorKind::ResourceNotFound => StatusCode::NOT_FOUND,
            AuthErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for [`AuthError::InvalidInput`].
    pub(crate) fn invalid(reason: &'static str) -> Self {
        Self::InvalidInput { reason }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Internal(err)
    }
}

/// Result type alias for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_not_found_and_unauthorized_are_indistinguishable() {
        assert_eq!(AuthError::ResourceNotFound.to_string(), AuthError::Unauthorized.to_string());
        assert_eq!(AuthError::Unauthorized.to_string(), RESOURCE_DENIED_MESSAGE);
    }

    #[test]
    fn test_internal_hides_source_in_message() {
        let err = AuthError::from(StorageError::connection("db-primary.internal:5432 refused"));
        assert_eq!(err.to_string(), "Internal error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_input_message() {
        let uuid = AuthError::invalid("resource id must be a UUID");
        let caller = AuthError::invalid("caller id is too long");
        assert_eq!(uuid.to_string(), "Invalid input");
        assert_eq!(uuid.to_string(), caller.to_string());
        assert!(matches!(uuid, AuthError::InvalidInput { reason: "resource id must be a UUID" }));
    }

    #[rstest]
    #[case(AuthError::invalid("x"), StatusCode::BAD_REQUEST, "invalid_input")]
    #[case(AuthError::Unauthenticated, StatusCode::UNAUTHORIZED, "unauthenticated")]
    #[case(AuthError::AuthenticationFailed, StatusCode::UNAUTHORIZED, "authentication_failed")]
    #[case(AuthError::ServiceUnavailable, StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")]
    #[case(AuthError::ResourceNotFound, StatusCode::NOT_FOUND, "resource_not_found")]
    #[case(AuthError::Unauthorized, StatusCode::FORBIDDEN, "unauthorized")]
    #[case(AuthError::Internal(StorageError::timeout()), StatusCode::INTERNAL_SERVER_ERROR, "internal")]
    fn test_status_and_kind(
        #[case] err: AuthError,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        assert_eq!(err.http_status(), status);
        assert_eq!(err.kind().as_str(), kind);
    }
}
