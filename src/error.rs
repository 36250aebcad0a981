use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The broker's error type.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The caller could not be authenticated (bad, expired or unknown session token).
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// A session token that cannot be parsed.
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    /// The caller is authenticated but not allowed to perform the request.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A persistent object was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request-level input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Ciphertext was malformed or failed authentication.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The shared remote cache could not be reached or returned an error.
    #[error("Remote cache unavailable: {0}")]
    RemoteCacheUnavailable(String),

    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A database pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `BrokerError` as the error type.
pub type Result<T> = std::result::Result<T, BrokerError>;

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::RemoteCacheUnavailable(err.to_string())
    }
}

impl From<sonic_rs::Error> for BrokerError {
    fn from(err: sonic_rs::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

impl BrokerError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            BrokerError::Unauthenticated(_) | BrokerError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            BrokerError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            BrokerError::Unauthenticated(ref msg) | BrokerError::InvalidToken(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                "Unauthenticated".to_string()
            }

            BrokerError::PermissionDenied(ref msg) => {
                tracing::warn!("Permission denied: {}", msg);
                msg.clone()
            }

            BrokerError::NotFound(ref msg) => {
                tracing::debug!("Not found: {}", msg);
                msg.clone()
            }

            BrokerError::InvalidArgument(ref msg) => {
                tracing::debug!("Invalid argument: {}", msg);
                msg.clone()
            }

            BrokerError::RemoteCacheUnavailable(ref msg) => {
                tracing::error!("Remote cache unavailable: {}", msg);
                "Cache error".to_string()
            }

            BrokerError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            BrokerError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                "Database error".to_string()
            }

            BrokerError::Decryption(ref msg) | BrokerError::Encryption(ref msg) => {
                tracing::error!("Crypto error: {}", msg);
                "Encryption error".to_string()
            }

            BrokerError::Serialization(ref msg) | BrokerError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BrokerError::InvalidToken("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            BrokerError::PermissionDenied("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BrokerError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrokerError::RemoteCacheUnavailable("down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
