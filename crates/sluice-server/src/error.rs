use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sluice_mirror::MirrorError;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;

/// Errors returned from request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request path cannot be decoded into a mirror request.
  #[error("missing or malformed path segment: {message}")]
  MissingSegment { message: String },

  #[error(transparent)]
  Unauthorized(#[from] AuthError),

  #[error(transparent)]
  Mirror(#[from] MirrorError),
}

impl ApiError {
  pub fn missing_segment(message: impl Into<String>) -> Self {
    Self::MissingSegment {
      message: message.into(),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::MissingSegment { .. } => StatusCode::BAD_REQUEST,
      Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      Self::Mirror(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request_failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
