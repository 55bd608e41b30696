//! Error types for the inference server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy for the inference runtime integration layer.
///
/// Every variant is classified and logged at the boundary where it first
/// occurs (FFI translation, lifecycle manager, or request handler); nothing
/// is swallowed silently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    LoadFailed(String),

    #[error("no model loaded")]
    NoModelLoaded,

    #[error("native inference call failed: {0}")]
    FfiError(String),

    #[error("invalid cache name: {0}")]
    CachePathInvalid(String),

    #[error("cache not found: {0}")]
    CacheMissing(String),

    #[error("failed to save prompt cache: {0}")]
    SaveCacheFailed(String),

    #[error("embeddings are disabled")]
    EmbeddingsDisabled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::ModelNotFound(_) => (StatusCode::NOT_FOUND, "model_not_found"),
            Error::LoadFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "load_failed"),
            Error::NoModelLoaded => (StatusCode::SERVICE_UNAVAILABLE, "no_model_loaded"),
            Error::FfiError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ffi_error"),
            Error::CachePathInvalid(_) => (StatusCode::BAD_REQUEST, "cache_path_invalid"),
            Error::CacheMissing(_) => (StatusCode::NOT_FOUND, "cache_missing"),
            Error::SaveCacheFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "save_cache_failed"),
            Error::EmbeddingsDisabled => (StatusCode::SERVICE_UNAVAILABLE, "embeddings_disabled"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        tracing::error!(error_type, message = %self, "request failed");

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Deleting the protected `system` cache is reported separately at the
/// handler layer (403, not the generic 400 of `CachePathInvalid`) since it
/// is a distinct, well-known condition callers should be able to match on.
pub struct Forbidden(pub String);

impl IntoResponse for Forbidden {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": "cache_protected",
                "message": self.0,
            }
        }));
        (StatusCode::FORBIDDEN, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_maps_to_404() {
        let err = Error::ModelNotFound("qwen3-0.6b".to_string());
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_no_model_loaded_maps_to_503() {
        let resp = Error::NoModelLoaded.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_stop_triggered_is_not_an_error_variant() {
        // StopTriggered is a normal termination, not a typed error; it is
        // represented by FinishReason in the normalizer, not this enum.
    }
}
