use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures raised by the authentication core.
///
/// Every variant is returned to the immediate caller; none are swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("required configuration missing: {0}")]
    ConfigMissing(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication required: {0}")]
    Unauthenticated(&'static str),

    #[error("access denied: insufficient role privileges")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("expired")]
    Expired,

    #[error("code mismatch")]
    Mismatch,

    #[error("malformed token")]
    Malformed,

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("too many requests")]
    RateLimited,

    #[error("upstream collaborator unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthenticated(_)
            | AuthError::Expired
            | AuthError::Mismatch
            | AuthError::Malformed
            | AuthError::SignatureMismatch => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Configuration and upstream details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::ConfigMissing(_) => "server misconfigured".to_string(),
            AuthError::Unavailable(_) => "service temporarily unavailable".to_string(),
            AuthError::Malformed | AuthError::SignatureMismatch | AuthError::Expired => {
                "invalid or expired token".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Failures raised by the field cipher. All of them are integrity or
/// configuration problems; none yield plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("could not decode ciphertext")]
    DecodeFailure,

    #[error("ciphertext too short")]
    TruncatedInput,

    #[error("ciphertext failed authentication")]
    AuthenticationFailure,

    #[error("encryption failed")]
    Encryption,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
