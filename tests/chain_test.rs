//! Integration tests for the request chain
//!
//! Requests are driven through the full router with `oneshot`; peer
//! addresses are simulated by inserting `ConnectInfo` extensions.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use notes_service::{
    config::Config,
    middleware::CredentialAuthority,
    notes::InMemoryStore,
    server::{build_app, App},
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

fn test_config() -> Config {
    let mut config = Config::default_config();
    config.auth.jwt_secret = secrecy::Secret::new("chain_test_secret".to_string());
    config.auth.bcrypt_cost = 4;
    config
}

fn production_config() -> Config {
    let mut config = test_config();
    config.server.env = "production".to_string();
    config.server.allowed_origins = "https://notes.example, https://admin.notes.example".to_string();
    config
}

fn app(config: &Config) -> App {
    build_app(config, Arc::new(InMemoryStore::new()))
}

fn request(method: Method, uri: &str, peer: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = peer.parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

async fn send(router: &Router, req: Request<Body>) -> Response {
    router.clone().oneshot(req).await.unwrap()
}

/// Log sink shared with a scoped subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_preflight_from_disallowed_origin_is_forbidden_in_production() {
    let app = app(&production_config());

    let req = request(Method::OPTIONS, "/notes", "10.0.0.1:5000")
        .header(header::ORIGIN, "https://evil.test")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid Origin: https://evil.test");
    assert_eq!(body["status"], 403);
    assert!(body["data"].is_null());

    // Rejected before the Rate Gate ever saw it
    assert!(app.chain.registry.is_empty());
}

#[tokio::test]
async fn test_preflight_from_allowed_origin() {
    let app = app(&production_config());

    let req = request(Method::OPTIONS, "/notes/7", "10.0.0.1:5000")
        .header(header::ORIGIN, "https://admin.notes.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://admin.notes.example");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    assert!(app.chain.registry.is_empty());
}

#[tokio::test]
async fn test_actual_request_from_disallowed_origin_in_production() {
    let app = app(&production_config());

    let req = request(Method::GET, "/status", "10.0.0.1:5000")
        .header(header::ORIGIN, "https://evil.test")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app.router, req).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_local_mode_is_permissive_and_sets_security_headers() {
    let app = app(&test_config());

    let req = request(Method::GET, "/status", "10.0.0.1:5000")
        .header(header::ORIGIN, "https://anywhere.test")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://anywhere.test");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], "max-age=31536000; includeSubDomains");
    assert!(headers[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .contains("connect-src 'self' https://anywhere.test"));

    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "OK");
}

#[tokio::test]
async fn test_burst_then_rate_limited() {
    let app = app(&test_config());

    for i in 0..10 {
        let req = request(Method::GET, "/status", "192.168.0.9:40000").body(Body::empty()).unwrap();
        assert_eq!(send(&app.router, req).await.status(), StatusCode::OK, "request {} should pass", i);
    }

    let req = request(Method::GET, "/status", "192.168.0.9:40000").body(Body::empty()).unwrap();
    let response = send(&app.router, req).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = json_body(response).await;
    assert_eq!(body["status"], 429);

    let req = request(Method::GET, "/status", "192.168.0.10:40000").body(Body::empty()).unwrap();
    assert_eq!(send(&app.router, req).await.status(), StatusCode::OK);
    assert_eq!(app.chain.registry.len(), 2);
}

#[tokio::test]
async fn test_new_connections_share_the_host_budget() {
    let app = app(&test_config());

    let mut allowed = 0;
    for port in 40000..40020 {
        let req = request(Method::GET, "/status", &format!("203.0.113.5:{}", port))
            .body(Body::empty())
            .unwrap();
        if send(&app.router, req).await.status() == StatusCode::OK {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 10);
    assert_eq!(app.chain.registry.len(), 1);
}

#[tokio::test]
async fn test_six_requests_within_burst_succeed() {
    let app = app(&test_config());

    for _ in 0..6 {
        let req = request(Method::GET, "/status", "172.16.0.2:1234").body(Body::empty()).unwrap();
        assert_eq!(send(&app.router, req).await.status(), StatusCode::OK);
    }
    assert!(app.chain.registry.available_tokens("172.16.0.2").unwrap() < 5.0);
}

#[tokio::test]
async fn test_protected_route_without_cookie_is_unauthorized() {
    let app = app(&test_config());

    let req = request(Method::GET, "/notes", "10.1.1.1:9000").body(Body::empty()).unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["status"], 401);
    assert!(body["data"].is_null());

    // The Rate Gate ran before the Identity Gate
    assert_eq!(app.chain.registry.len(), 1);
}

#[tokio::test]
async fn test_expired_credential_is_reported() {
    let config = test_config();
    let app = app(&config);
    let authority = CredentialAuthority::new(config.auth_config());
    let token = authority
        .issue_at(1, Utc::now() - chrono::Duration::minutes(61))
        .unwrap();

    let req = request(Method::GET, "/user/auth-check", "10.1.1.1:9000")
        .header(header::COOKIE, format!("notes_jwt={}", token))
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "credential has expired");
}

#[tokio::test]
async fn test_valid_credential_reaches_handler() {
    let config = test_config();
    let app = app(&config);
    let token = CredentialAuthority::new(config.auth_config()).issue(77).unwrap();

    let req = request(Method::GET, "/user/auth-check", "10.1.1.1:9000")
        .header(header::COOKIE, format!("theme=dark; notes_jwt={}", token))
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["authenticated"], true);
    assert_eq!(body["data"]["user_id"], 77);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_returns_gateway_timeout() {
    let app = app(&test_config());
    let router = app.chain.apply(Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        }),
    ));

    let req = request(Method::GET, "/slow", "10.2.2.2:1000").body(Body::empty()).unwrap();
    let response = send(&router, req).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response).await["status"], 504);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let app = app(&test_config());
    let router = app.chain.apply(Router::new().route(
        "/boom",
        get(|| async {
            if true {
                panic!("handler exploded");
            }
            "unreachable"
        }),
    ));

    let req = request(Method::GET, "/boom", "10.2.2.2:1000").body(Body::empty()).unwrap();
    let response = send(&router, req).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Internal server error");

    // The server keeps serving afterwards
    let req = request(Method::GET, "/status", "10.2.2.2:1000").body(Body::empty()).unwrap();
    assert_eq!(send(&app.router, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_exclude_the_exporter() {
    let app = app(&test_config());

    let req = request(Method::GET, "/status", "10.3.3.3:1000").body(Body::empty()).unwrap();
    send(&app.router, req).await;
    let req = request(Method::GET, "/prometheus-metrics", "10.3.3.3:1000").body(Body::empty()).unwrap();
    send(&app.router, req).await;

    let req = request(Method::GET, "/prometheus-metrics", "10.3.3.3:1000").body(Body::empty()).unwrap();
    let response = send(&app.router, req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total{method=\"GET\",path=\"/status\",status=\"200\"} 1"));
    assert!(!text.contains("path=\"/prometheus-metrics\""));
    assert_eq!(app.chain.metrics.total_requests(), 1);
}

#[tokio::test]
async fn test_wrong_method_returns_envelope() {
    let app = app(&test_config());

    let req = request(Method::DELETE, "/status", "10.4.4.5:1000").body(Body::empty()).unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "The DELETE method is not supported for this resource");
    assert_eq!(body["status"], 405);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_access_log_is_written_at_info() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = app(&test_config());
    let req = request(Method::GET, "/status", "10.4.4.6:1000").body(Body::empty()).unwrap();
    assert_eq!(send(&app.router, req).await.status(), StatusCode::OK);

    let output = logs.contents();
    assert!(output.contains("finished processing request"), "no access log in: {}", output);
    assert!(output.contains("status=200"));
}

#[tokio::test]
async fn test_unknown_route_returns_envelope() {
    let app = app(&test_config());

    let req = request(Method::GET, "/nope", "10.4.4.4:1000").body(Body::empty()).unwrap();
    let response = send(&app.router, req).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "The requested resource could not be found");
}
