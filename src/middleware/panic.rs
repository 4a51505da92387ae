//! Panic containment
//!
//! Used with `tower_http::catch_panic::CatchPanicLayer::custom`. The panic
//! is logged with a short call trace and the client gets a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::backtrace::Backtrace;
use tracing::error;

use crate::api::response::Envelope;

/// Lines of call trace kept in the log entry
const TRACE_LINES: usize = 10;

const GENERIC_MESSAGE: &str = "Internal server error";

/// Convert a caught panic into a 500 response
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    let trace = Backtrace::force_capture().to_string();
    let trace: Vec<&str> = trace.lines().take(TRACE_LINES).collect();

    error!(panic = %message, trace = %trace.join("\n"), "Recovered from panic");

    Envelope::<()>::error(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_MESSAGE).into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_response_hides_panic_details() {
        let response = handle_panic(Box::new("secret detail"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], GENERIC_MESSAGE);
        assert_eq!(json["status"], 500);
    }
}
