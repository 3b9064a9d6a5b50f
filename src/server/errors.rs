//! HTTP error responses
//!
//! Every failure leaves the server as `{"detail": "<message>"}` with a status
//! code chosen by the error kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::QaError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request body was malformed or out of range
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] QaError),
}

impl ApiError {
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
