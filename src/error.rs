//! Error types shared by the callback handlers.
//!
//! Two shapes of error reach the wire:
//! - [`DomainError`] carries a stable identifier and an untranslated message. On the failure
//!   redirect these become `error` and `error_description`.
//! - Everything else is unstructured and only contributes its display text as `error`.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{cache::CacheError, crypto::CryptoError, idp::IdpError};

/// Classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unimplemented,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured error with a stable identifier.
#[derive(Debug, Error)]
#[error("ID={id} Message={message}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub id: &'static str,
    pub message: &'static str,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DomainError {
    fn new(kind: ErrorKind, id: &'static str, message: &'static str) -> Self {
        Self {
            kind,
            id,
            message,
            source: None,
        }
    }

    pub fn invalid_argument(id: &'static str, message: &'static str) -> Self {
        Self::new(ErrorKind::InvalidArgument, id, message)
    }

    pub fn not_found(id: &'static str, message: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, id, message)
    }

    pub fn unimplemented(id: &'static str, message: &'static str) -> Self {
        Self::new(ErrorKind::Unimplemented, id, message)
    }

    pub fn internal(id: &'static str, message: &'static str) -> Self {
        Self::new(ErrorKind::Internal, id, message)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Errors reported by intent and identity-link backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The backend rejected a state transition, e.g. finalizing an already terminal intent.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Top-level error for everything a callback can run into.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Idp(#[from] IdpError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl CallbackError {
    /// The `error` and `error_description` values for a failure redirect.
    pub fn failure_params(&self) -> (String, String) {
        match self {
            CallbackError::Domain(e) => (e.id.to_string(), e.message.to_string()),
            other => (other.to_string(), String::new()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CallbackError::Domain(DomainError {
                kind: ErrorKind::NotFound,
                ..
            }) | CallbackError::Store(StoreError::NotFound(_))
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CallbackError::Domain(DomainError {
                kind: ErrorKind::Internal,
                ..
            })
            | CallbackError::Store(StoreError::Backend(_))
            | CallbackError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Bare error response for requests that cannot be tied to a trusted redirect target.
impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Callback request failed");
        } else {
            tracing::debug!(error = %self, "Callback request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_surfaces_id_and_message() {
        let err: CallbackError = DomainError::invalid_argument("IDP-Hk38e", "state missing").into();
        assert_eq!(
            err.failure_params(),
            ("IDP-Hk38e".to_string(), "state missing".to_string())
        );
    }

    #[test]
    fn unstructured_error_surfaces_message_only() {
        let err: CallbackError = IdpError::Exchange("invalid_grant".into()).into();
        let (error, description) = err.failure_params();
        assert_eq!(error, "Token exchange failed: invalid_grant");
        assert!(description.is_empty());
    }

    #[test]
    fn wrapped_source_keeps_outer_identity() {
        let err = DomainError::internal("IDP-JdD3g", "token creation failed")
            .with_source(StoreError::Conflict("intent already succeeded".into()));
        assert!(std::error::Error::source(&err).is_some());
        let err: CallbackError = err.into();
        assert_eq!(err.failure_params().0, "IDP-JdD3g");
    }

    #[test]
    fn not_found_detection() {
        let err: CallbackError = DomainError::not_found("IDP-Inte7", "intent not found").into();
        assert!(err.is_not_found());
        let err: CallbackError = StoreError::NotFound("intent".into()).into();
        assert!(err.is_not_found());
        let err: CallbackError = StoreError::Backend("down".into()).into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn status_codes() {
        let bad: CallbackError = DomainError::invalid_argument("X", "y").into();
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);
        let internal: CallbackError = StoreError::Backend("down".into()).into();
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
