//! Assembly of the application from configuration

use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::{build_router, AppState},
    config::Config,
    middleware::{AdmissionRegistry, ChainState, CredentialAuthority},
    notes::{NoteStore, NotesService, UserService},
    observability::HttpMetrics,
};

/// A ready-to-serve router plus the shared state behind it
pub struct App {
    pub router: Router,
    pub chain: ChainState,
}

/// Wire services, chain stages and routes together
pub fn build_app(config: &Config, store: Arc<dyn NoteStore>) -> App {
    let registry = Arc::new(AdmissionRegistry::new(config.rate_limit_config()));
    let authority = Arc::new(CredentialAuthority::new(config.auth_config()));
    let metrics = Arc::new(HttpMetrics::new());

    let chain = ChainState {
        registry,
        authority: authority.clone(),
        cors: Arc::new(config.cors_policy()),
        metrics: metrics.clone(),
        request_timeout: config.request_timeout(),
    };

    let app_state = AppState {
        notes: NotesService::new(store.clone()),
        users: UserService::new(store, authority, config.auth.bcrypt_cost),
        metrics,
    };

    info!(
        env = %config.server.env,
        rate_per_sec = config.rate_limit.rate_per_sec,
        burst = config.rate_limit.burst,
        timeout_secs = config.server.request_timeout_secs,
        "Application assembled"
    );

    App {
        router: build_router(app_state, &chain),
        chain,
    }
}
