//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use gruff_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Wraps a core error; the kind decides
/// the status code.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub gruff_core::Error);

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self(gruff_core::Error::business(rejection.body_text()))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let e = self.0;
    let status = StatusCode::from_u16(e.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if e.kind == ErrorKind::Server {
      tracing::error!(error = %e, at = %e.captured_at(), "request failed");
    }

    let mut body = json!({
      "error": e.message,
      "code": e.code(),
    });
    if let Some(subcode) = e.subcode {
      body["subcode"] = json!(subcode);
    }
    if !e.data.is_empty() {
      body["data"] = json!(e.data);
    }

    let mut res = (status, Json(body)).into_response();
    if e.kind == ErrorKind::Unauthorized {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"gruff\""),
      );
    }
    res
  }
}
