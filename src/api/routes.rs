//! API route configuration

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{self, AppState};
use crate::middleware::ChainState;
use crate::observability::METRICS_PATH;

/// Build the complete API router with the request chain applied
pub fn build_router(app_state: AppState, chain: &ChainState) -> Router {
    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/status", get(handlers::status))
        .route(METRICS_PATH, get(handlers::prometheus_metrics))
        .route("/user/register", post(handlers::register))
        .route("/user/login", post(handlers::login))
        .route("/user/logout", post(handlers::logout));

    // Protected routes (Identity Gate)
    let protected_routes = chain.protect(
        Router::new()
            .route("/user/auth-check", get(handlers::auth_check))
            .route("/notes", get(handlers::list_notes).post(handlers::create_note))
            .route("/notes/filter", get(handlers::filter_notes))
            .route(
                "/notes/:note_id",
                get(handlers::get_note)
                    .put(handlers::update_note)
                    .delete(handlers::delete_note),
            )
            .route("/notes/:note_id/archive-toggle", put(handlers::toggle_archive))
            .route(
                "/notes/:note_id/categories/:category_name",
                post(handlers::add_category).delete(handlers::remove_category),
            ),
    );

    let router = public_routes
        .merge(protected_routes)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .with_state(app_state);

    chain.apply(router)
}
