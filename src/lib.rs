//! Notes Service - notes API with per-client admission control
//!
//! Every request runs through a fixed chain: panic containment, security and
//! CORS headers, metrics, a per-request deadline, token-bucket rate limiting
//! keyed by client address and, on protected routes, verification of a JWT
//! carried in the `notes_jwt` cookie.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notes_service::prelude::*;
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_file_with_env("config.toml")?;
//!     let app = build_app(&config, Arc::new(InMemoryStore::new()));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8025").await
//!         .map_err(|e| NotesError::Internal(e.to_string()))?;
//!     axum::serve(listener, app.router.into_make_service_with_connect_info::<SocketAddr>())
//!         .await
//!         .map_err(|e| NotesError::Internal(e.to_string()))?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod notes;
pub mod observability;
pub mod server;

pub use config::Config;
pub use error::{NotesError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{NotesError, Result};
    pub use crate::middleware::{AdmissionRegistry, ChainState, CorsPolicy, CredentialAuthority, RateLimitConfig, VerifiedIdentity};
    pub use crate::notes::{InMemoryStore, NoteStore, NotesService, UserService};
    pub use crate::observability::HttpMetrics;
    pub use crate::server::{build_app, App};
}
