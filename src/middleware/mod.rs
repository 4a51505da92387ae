//! Middleware components for request processing

pub mod rate_limiter;
pub mod auth;
pub mod validator;
pub mod cors;
pub mod deadline;
pub mod panic;
pub mod chain;

pub use rate_limiter::{AdmissionRegistry, EvictionPolicy, RateLimitConfig, RateLimitError};
pub use auth::{AuthConfig, AuthError, CredentialAuthority, VerifiedIdentity};
pub use validator::{InputValidator, ValidationError};
pub use cors::CorsPolicy;
pub use deadline::{RequestDeadline, DEFAULT_REQUEST_TIMEOUT};
pub use chain::ChainState;
