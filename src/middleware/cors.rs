//! Security headers and CORS negotiation
//!
//! Origins are checked against the configured allow-list only in production;
//! other execution modes echo whatever origin the browser sent.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::NotesError;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";
const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

/// Origin policy and header values for the service
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    enforce: bool,
    docs_path: String,
}

impl CorsPolicy {
    /// Build a policy from a comma-separated origin list. Spaces are ignored.
    pub fn new(allowed_origins: &str, enforce: bool, docs_path: impl Into<String>) -> Self {
        let allowed_origins = allowed_origins
            .replace(' ', "")
            .split(',')
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            allowed_origins,
            enforce,
            docs_path: docs_path.into(),
        }
    }

    /// Whether a declared origin is on the allow-list. Same-origin requests
    /// carry no `Origin` header and are always allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        origin.is_empty() || self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    /// Whether a request with this origin must be refused
    pub fn blocks(&self, origin: &str) -> bool {
        self.enforce && !self.is_allowed(origin)
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Content-Security-Policy for a path. The documentation UI needs inline
    /// scripts and eval.
    pub fn content_security_policy(&self, path: &str, origin: &str) -> String {
        if path.starts_with(&self.docs_path) {
            format!(
                "default-src 'self' 'unsafe-inline' 'unsafe-eval'; img-src data: https://cdn.ngrok.com; connect-src 'self' {}",
                origin
            )
        } else {
            format!(
                "default-src 'self'; connect-src 'self' {}; img-src 'self' data:; script-src 'self' 'unsafe-inline'",
                origin
            )
        }
    }
}

fn set_static(headers: &mut HeaderMap, name: HeaderName, value: &'static str) {
    headers.insert(name, HeaderValue::from_static(value));
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: &str) {
    set_static(headers, header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
    set_static(headers, header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS);
    set_static(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS);
    if !origin.is_empty() {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
}

fn apply_security_headers(headers: &mut HeaderMap) {
    set_static(headers, header::STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains");
    set_static(headers, header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set_static(headers, header::X_FRAME_OPTIONS, "DENY");
    set_static(headers, header::X_XSS_PROTECTION, "1; mode=block");
}

/// CORS and security header middleware.
///
/// Pre-flight requests are answered here and never reach later stages.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if policy.blocks(&origin) {
        warn!("Blocked request from origin: {}", origin);
        return NotesError::OriginForbidden(origin).into_response();
    }

    if req.method() == Method::OPTIONS {
        debug!("Answering preflight for origin: {}", origin);
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        apply_cors_headers(headers, &origin);
        set_static(headers, header::ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE_SECS);
        return response;
    }

    let csp = policy.content_security_policy(req.uri().path(), &origin);
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    apply_cors_headers(headers, &origin);
    apply_security_headers(headers);
    if let Ok(value) = HeaderValue::from_str(&csp) {
        headers.insert(header::CONTENT_SECURITY_POLICY, value);
    }

    response
}
