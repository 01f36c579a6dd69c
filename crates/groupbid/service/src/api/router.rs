//! API router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Groups
        .route("/groups", get(handlers::list_groups))
        .route("/groups", post(handlers::create_group))
        .route("/groups/:id", get(handlers::get_group))
        .route("/groups/:id/journal", get(handlers::get_journal))
        .route("/groups/:id/evaluate", post(handlers::evaluate_candidates))
        .route("/groups/:id/join", post(handlers::join_group))
        .route("/groups/:id/leave", post(handlers::leave_group))
        .route("/groups/:id/close-formation", post(handlers::close_formation))
        .route("/groups/:id/dissolve", post(handlers::dissolve))
        // Bids
        .route("/groups/:id/bids", post(handlers::submit_bid))
        .route("/groups/:id/bids/invalidate", post(handlers::invalidate_bid))
        .route("/groups/:id/bids/:bid_id/accept", post(handlers::accept))
        .route("/groups/:id/bids/:bid_id/revoke", post(handlers::revoke))
        .route("/groups/:id/bids/:bid_id/extend", post(handlers::extend_deadline))
        // Payment collaborator callbacks
        .route("/payments/callback", post(handlers::payment_callback))
        // Operational
        .route("/sweep", post(handlers::trigger_sweep));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
