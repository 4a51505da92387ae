//! End-to-end tests of the notes API through the full router

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use notes_service::{config::Config, notes::InMemoryStore, server::build_app};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;

/// Test client that gives every request its own peer address so the Rate
/// Gate does not interfere with longer flows
struct TestClient {
    router: Router,
    next_host: u16,
}

impl TestClient {
    fn new() -> Self {
        let mut config = Config::default_config();
        config.auth.jwt_secret = secrecy::Secret::new("notes_api_secret".to_string());
        config.auth.bcrypt_cost = 4;

        Self {
            router: build_app(&config, Arc::new(InMemoryStore::new())).router,
            next_host: 0,
        }
    }

    async fn call(&mut self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Response {
        self.next_host += 1;
        let addr: SocketAddr = format!("10.20.{}.{}:5000", self.next_host / 256, self.next_host % 256)
            .parse()
            .unwrap();

        let mut builder = Request::builder().method(method).uri(uri).extension(ConnectInfo(addr));
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn register(&mut self, user_name: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/user/register",
                None,
                Some(json!({"user_name": user_name, "password": "secret1"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        session_cookie(&response)
    }
}

fn session_cookie(response: &Response) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_register_login_logout() {
    let mut client = TestClient::new();

    let response = client
        .call(
            Method::POST,
            "/user/register",
            None,
            Some(json!({"user_name": "JaneDoe", "password": "secret1"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("notes_jwt="));
    assert!(set_cookie.contains("HttpOnly"));
    let body = json_body(response).await;
    assert_eq!(body["data"]["user_name"], "janedoe");
    assert!(body["error"].is_null());

    let response = client
        .call(
            Method::POST,
            "/user/login",
            None,
            Some(json!({"user_name": "janedoe", "password": "wrong1"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .call(
            Method::POST,
            "/user/login",
            None,
            Some(json!({"user_name": "janedoe", "password": "secret1"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);

    let response = client.call(Method::GET, "/user/auth-check", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.call(Method::POST, "/user/logout", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cleared.starts_with("notes_jwt=;"));
    assert_eq!(json_body(response).await["data"]["message"], "Logout successful");
}

#[tokio::test]
async fn test_register_validation() {
    let mut client = TestClient::new();

    let response = client
        .call(
            Method::POST,
            "/user/register",
            None,
            Some(json!({"user_name": "abc", "password": "secret1"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .call(Method::POST, "/user/register", None, Some(json!({"user_name": "janedoe"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], 400);
}

#[tokio::test]
async fn test_note_flow() {
    let mut client = TestClient::new();
    let cookie = client.register("janedoe").await;

    let response = client.call(Method::GET, "/notes", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "no notes found");

    let response = client
        .call(
            Method::POST,
            "/notes",
            Some(&cookie),
            Some(json!({"title": "weekly groceries", "content": "Milk, eggs and bread", "categories": ["home"]})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let note = json_body(response).await["data"].clone();
    assert_eq!(note["title"], "Weekly Groceries");
    assert_eq!(note["content"], "milk, eggs and bread");
    let id = note["id"].as_u64().unwrap();

    let response = client
        .call(Method::POST, &format!("/notes/{}/categories/errands", id), Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["categories"].as_array().unwrap().len(), 2);

    let response = client
        .call(Method::PUT, &format!("/notes/{}/archive-toggle", id), Some(&cookie), None)
        .await;
    assert_eq!(json_body(response).await["data"]["is_archived"], true);

    let response = client
        .call(Method::GET, "/notes/filter?isArchived=true&categories=errands", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"][0]["id"], id);

    let response = client
        .call(Method::GET, "/notes/filter?isArchived=maybe", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .call(
            Method::PUT,
            &format!("/notes/{}", id),
            Some(&cookie),
            Some(json!({
                "title": "Weekly Groceries",
                "content": "milk, eggs and bread",
                "categories": ["Home", "Errands"],
                "is_archived": true
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "no changes detected");

    let response = client
        .call(Method::DELETE, &format!("/notes/{}/categories/home", id), Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.call(Method::DELETE, &format!("/notes/{}", id), Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["id"], id);

    let response = client.call(Method::GET, &format!("/notes/{}", id), Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notes_are_private() {
    let mut client = TestClient::new();
    let owner = client.register("owneruser").await;
    let other = client.register("otheruser").await;

    let response = client
        .call(
            Method::POST,
            "/notes",
            Some(&owner),
            Some(json!({"title": "Secret Plans", "content": "nobody else may read", "categories": ["private"]})),
        )
        .await;
    let id = json_body(response).await["data"]["id"].as_u64().unwrap();

    let response = client.call(Method::GET, &format!("/notes/{}", id), Some(&other), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "note does not belong to the user");

    let response = client.call(Method::GET, "/notes/not-a-number", Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
