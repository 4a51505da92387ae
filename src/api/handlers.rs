//! API request handlers

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, Method, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::response::Envelope;
use crate::{
    error::{NotesError, Result},
    middleware::{ValidationError, VerifiedIdentity},
    notes::{Note, NoteUpdate, NotesService, User, UserService},
    observability::HttpMetrics,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub notes: NotesService,
    pub users: UserService,
    pub metrics: Arc<HttpMetrics>,
}

/// Credentials for registration and login
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_name: String,
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: u64,
    pub user_name: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
        }
    }
}

/// Request to create a note
#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Query of the filter endpoint; `categories` is comma-separated
#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    #[serde(rename = "isArchived")]
    pub is_archived: Option<String>,
    pub categories: Option<String>,
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::InvalidBody(rejection.body_text()).into())
}

fn note_id(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidNoteId(raw.to_string()).into())
}

/// Service liveness
pub async fn status() -> impl IntoResponse {
    Envelope::ok(StatusCode::OK, json!({"status": "OK"}))
}

/// Prometheus scrape endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

/// Create an account and start a session
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UserRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let req = body(payload)?;
    let (user, token) = state.users.register(&req.user_name, &req.password).await?;
    let cookie = state.users.authority().session_cookie(&token);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Envelope::ok(StatusCode::CREATED, UserResponse::from(user)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UserRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let req = body(payload)?;
    let (user, token) = state.users.login(&req.user_name, &req.password).await?;
    let cookie = state.users.authority().session_cookie(&token);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Envelope::ok(StatusCode::OK, UserResponse::from(user)),
    ))
}

/// End the session by clearing the credential cookie
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, state.users.authority().cleared_cookie())]),
        Envelope::ok(StatusCode::OK, json!({"message": "Logout successful"})),
    )
}

pub async fn auth_check(identity: VerifiedIdentity) -> impl IntoResponse {
    Envelope::ok(
        StatusCode::OK,
        json!({"authenticated": true, "user_id": identity.subject()}),
    )
}

pub async fn create_note(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    payload: std::result::Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<Envelope<Note>> {
    let req = body(payload)?;
    let note = state
        .notes
        .create(identity.subject(), &req.title, &req.content, &req.categories)
        .await?;
    Ok(Envelope::ok(StatusCode::CREATED, note))
}

pub async fn list_notes(State(state): State<AppState>, identity: VerifiedIdentity) -> Result<Envelope<Vec<Note>>> {
    let notes = state.notes.list(identity.subject()).await?;
    Ok(Envelope::ok(StatusCode::OK, notes))
}

pub async fn filter_notes(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    query: std::result::Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Envelope<Vec<Note>>> {
    let Query(query) = query.map_err(|rejection| ValidationError::InvalidQuery(rejection.body_text()))?;

    let is_archived = match query.is_archived.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<bool>()
                .map_err(|_| ValidationError::InvalidQuery(format!("isArchived={}", raw)))?,
        ),
    };
    let categories: Vec<String> = query
        .categories
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .collect();

    let notes = state
        .notes
        .filter(identity.subject(), is_archived, &categories)
        .await?;
    Ok(Envelope::ok(StatusCode::OK, notes))
}

pub async fn get_note(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path(raw_id): Path<String>,
) -> Result<Envelope<Note>> {
    let note = state.notes.get(identity.subject(), note_id(&raw_id)?).await?;
    Ok(Envelope::ok(StatusCode::OK, note))
}

pub async fn update_note(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path(raw_id): Path<String>,
    payload: std::result::Result<Json<NoteUpdate>, JsonRejection>,
) -> Result<Envelope<Note>> {
    let id = note_id(&raw_id)?;
    let update = body(payload)?;
    let note = state.notes.update(identity.subject(), id, update).await?;
    Ok(Envelope::ok(StatusCode::OK, note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = state.notes.delete(identity.subject(), note_id(&raw_id)?).await?;
    Ok(Envelope::ok(StatusCode::OK, json!({"id": id})))
}

pub async fn toggle_archive(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path(raw_id): Path<String>,
) -> Result<Envelope<Note>> {
    let note = state.notes.toggle_archive(identity.subject(), note_id(&raw_id)?).await?;
    Ok(Envelope::ok(StatusCode::OK, note))
}

pub async fn add_category(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path((raw_id, category)): Path<(String, String)>,
) -> Result<Envelope<Note>> {
    let note = state
        .notes
        .add_category(identity.subject(), note_id(&raw_id)?, &category)
        .await?;
    Ok(Envelope::ok(StatusCode::OK, note))
}

pub async fn remove_category(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    Path((raw_id, category)): Path<(String, String)>,
) -> Result<Envelope<Note>> {
    let note = state
        .notes
        .remove_category(identity.subject(), note_id(&raw_id)?, &category)
        .await?;
    Ok(Envelope::ok(StatusCode::OK, note))
}

/// Fallback for unknown routes
pub async fn not_found() -> NotesError {
    NotesError::NotFound
}

pub async fn method_not_allowed(method: Method) -> NotesError {
    NotesError::MethodNotAllowed(method.to_string())
}
