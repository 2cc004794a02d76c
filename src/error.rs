//! Error types for Fedipost
//!
//! Federation failures are described by `FederationError`, which follows the
//! protocol's error taxonomy. Everything that reaches an HTTP handler is
//! converted to `AppError`, which implements `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Federation protocol errors
///
/// Signature parsing and verification failures are local to a request and
/// never retried server-side.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Request carries no `Signature` header
    #[error("Missing Signature header")]
    MissingSignature,

    /// `Signature` header could not be parsed
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Signature algorithm other than rsa-sha256
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A covered header is absent from the request
    #[error("Missing header: {0}")]
    MissingHeader(String),

    /// Remote actor could not be fetched (network, timeout, bad response)
    #[error("Actor unreachable: {0}")]
    ActorUnreachable(String),

    /// Actor document has no usable public key
    #[error("Actor has no public key: {0}")]
    NoPublicKey(String),

    /// Signature bytes do not match the reconstructed signing string
    #[error("Invalid signature")]
    InvalidSignature,

    /// `Digest` header does not match the request body
    #[error("Digest mismatch")]
    DigestMismatch,

    /// Signed `Date` is outside the accepted window
    #[error("Signature date out of range")]
    StaleSignature,

    /// Activity actor differs from the signing actor
    #[error("Activity actor {activity_actor} does not match signer {signer}")]
    SenderMismatch {
        activity_actor: String,
        signer: String,
    },

    /// Activity type the inbox does not handle
    #[error("Unknown activity type: {0}")]
    UnknownActivityType(String),

    /// Body is not a usable activity
    #[error("Malformed activity: {0}")]
    MalformedActivity(String),

    /// Outbound delivery failed
    #[error("Delivery to {inbox} failed: {reason}")]
    Transport {
        inbox: String,
        status: Option<u16>,
        reason: String,
    },

    /// Local key material could not be generated or decoded
    #[error("Key error: {0}")]
    Key(String),
}

impl FederationError {
    /// Whether the error means the request's authenticity could not be established
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            FederationError::MissingSignature
                | FederationError::MalformedSignature(_)
                | FederationError::UnsupportedAlgorithm(_)
                | FederationError::MissingHeader(_)
                | FederationError::ActorUnreachable(_)
                | FederationError::NoPublicKey(_)
                | FederationError::InvalidSignature
                | FederationError::DigestMismatch
                | FederationError::StaleSignature
                | FederationError::SenderMismatch { .. }
        )
    }
}

/// Application-wide error type
///
/// Maps each failure to an HTTP status code and a JSON error body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Host is not allowed as a federation target (403)
    #[error("Access denied")]
    Forbidden,

    /// Federation protocol failure (401/400/502)
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status and metric label for this error
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Federation(err) if err.is_authentication_failure() => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AppError::Federation(
                FederationError::UnknownActivityType(_) | FederationError::MalformedActivity(_),
            ) => (StatusCode::BAD_REQUEST, "bad_activity"),
            AppError::Federation(FederationError::Key(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "key")
            }
            AppError::Federation(_) => (StatusCode::BAD_GATEWAY, "federation"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Internal details (database, config, internal) are not exposed to the caller.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();
        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) | AppError::Config(_) => "Internal server error".to_string(),
            AppError::Federation(FederationError::Key(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
