//! Per-request deadline enforcement

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::NotesError;

/// Default upper bound on time spent serving a request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Deadline attached to each request so later stages can check how much
/// time is left
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline(pub Instant);

impl RequestDeadline {
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Abandons the downstream work once `timeout` has elapsed and answers 504.
/// Dropping the inner future cancels anything still waiting on it.
pub async fn deadline_middleware(
    State(timeout): State<Duration>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    req.extensions_mut().insert(RequestDeadline(Instant::now() + timeout));
    let path = req.uri().path().to_string();

    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request to {} exceeded deadline of {:?}", path, timeout);
            NotesError::DeadlineExceeded(timeout).into_response()
        }
    }
}
