//! JSON response envelope shared by every endpoint

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `{"error": ..., "data": ..., "status": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub error: Option<String>,
    pub data: Option<T>,
    pub status: u16,
}

impl<T: Serialize> Envelope<T> {
    /// Successful response carrying `data`
    pub fn ok(status: StatusCode, data: T) -> Self {
        Self {
            error: None,
            data: Some(data),
            status: status.as_u16(),
        }
    }

    /// Failed response carrying a message
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            data: None,
            status: status.as_u16(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
