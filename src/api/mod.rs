//! HTTP API: response envelope, handlers and routing

pub mod handlers;
pub mod response;
pub mod routes;

pub use handlers::AppState;
pub use response::Envelope;
pub use routes::build_router;
