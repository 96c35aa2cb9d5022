use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use entente_shared::CryptoError;
use entente_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request - {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Any envelope decrypt/unwrap/tag failure.  The body never names the
    /// failing crypto step.
    #[error("Invalid request - unable to open payload")]
    Crypto,

    #[error("Peer call failed: {0}")]
    Peer(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedPayload => {
                ApiError::Validation("unable to convert payload to JSON".to_string())
            }
            CryptoError::SignatureMismatch => {
                ApiError::Validation("signature does not match".to_string())
            }
            // Open, Seal, MalformedField, Key: one indistinguishable 400.
            _ => ApiError::Crypto,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("No such record".to_string()),
            StoreError::HandleTaken(handle) => {
                ApiError::Validation(format!("handle already taken: {handle}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Crypto => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Peer(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
