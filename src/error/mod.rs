//! Error types for the notes service
//!
//! Every failure that can leave the request chain is a [`NotesError`]. The
//! mapping from error to HTTP status lives in exactly one place,
//! [`NotesError::kind`], and is an exhaustive match so that adding a variant
//! without deciding its status is a compile error.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::api::response::Envelope;
use crate::middleware::{AuthError, RateLimitError, ValidationError};

/// Result type alias for notes service operations
pub type Result<T> = std::result::Result<T, NotesError>;

/// Main error type for the notes service
#[derive(Error, Debug)]
pub enum NotesError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    RateLimit(#[from] RateLimitError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Note(#[from] NoteError),

    #[error("Invalid Origin: {0}")]
    OriginForbidden(String),

    #[error("request exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("The requested resource could not be found")]
    NotFound,

    #[error("The {0} method is not supported for this resource")]
    MethodNotAllowed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the note, category and user collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error("note {0} not found")]
    NoteNotFound(u64),

    #[error("note does not belong to the user")]
    NotOwnedByUser,

    #[error("a note with this title already exists")]
    DuplicateTitle,

    #[error("no notes found")]
    NoNotesFound,

    #[error("no changes detected")]
    NoChangesDetected,

    #[error("a note holds at most {max} categories")]
    TooManyCategories { max: usize },

    #[error("a note needs at least one category")]
    MinCategory,

    #[error("category already added to this note")]
    CategoryAlreadyAdded,

    #[error("category not found on this note")]
    CategoryNotOnNote,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("user {0} not found")]
    UserNotFound(u64),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Response class an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Auth,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RateLimited,
    Gateway,
    Server,
}

impl ErrorKind {
    /// HTTP status for this kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Client => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Gateway => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl NotesError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotesError::Validation(_) => ErrorKind::Client,
            NotesError::RateLimit(RateLimitError::LimitExceeded { .. }) => ErrorKind::RateLimited,
            NotesError::Auth(err) => match err {
                AuthError::MissingCredential
                | AuthError::InvalidCredential
                | AuthError::ExpiredCredential
                | AuthError::MissingIdentity
                | AuthError::InvalidLogin => ErrorKind::Auth,
                AuthError::Issue(_) => ErrorKind::Server,
            },
            NotesError::Note(err) => match err {
                NoteError::NoteNotFound(_) | NoteError::UserNotFound(_) => ErrorKind::NotFound,
                NoteError::NotOwnedByUser
                | NoteError::DuplicateTitle
                | NoteError::NoNotesFound
                | NoteError::NoChangesDetected
                | NoteError::TooManyCategories { .. }
                | NoteError::MinCategory
                | NoteError::CategoryAlreadyAdded
                | NoteError::CategoryNotOnNote
                | NoteError::UserAlreadyExists => ErrorKind::Client,
                NoteError::Hashing(_) => ErrorKind::Server,
            },
            NotesError::OriginForbidden(_) => ErrorKind::Forbidden,
            NotesError::DeadlineExceeded(_) => ErrorKind::Gateway,
            NotesError::NotFound => ErrorKind::NotFound,
            NotesError::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            NotesError::Config(_) | NotesError::Internal(_) => ErrorKind::Server,
        }
    }

    /// HTTP status code surfaced for this error
    pub fn status_code(&self) -> StatusCode {
        self.kind().status()
    }
}

impl IntoResponse for NotesError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.kind() {
            ErrorKind::Server | ErrorKind::Gateway => error!(status = status.as_u16(), error = %self, "request failed"),
            ErrorKind::RateLimited | ErrorKind::Forbidden => warn!(status = status.as_u16(), error = %self, "request rejected"),
            _ => debug!(status = status.as_u16(), error = %self, "request rejected"),
        }

        let retry_after = match &self {
            NotesError::RateLimit(RateLimitError::LimitExceeded { retry_after, .. }) => Some(*retry_after),
            _ => None,
        };

        let mut response = Envelope::<()>::error(status, self.to_string()).into_response();
        if let Some(retry_after) = retry_after {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<config::ConfigError> for NotesError {
    fn from(err: config::ConfigError) -> Self {
        NotesError::Config(err.to_string())
    }
}
