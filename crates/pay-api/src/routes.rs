//! # Routes
//!
//! Axum router configuration for the checkout-session API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Sessions:
///   - POST /api/v1/sessions - Start a checkout session
///   - GET  /api/v1/sessions/{handle} - Session state and outcome
///   - POST /api/v1/sessions/{handle}/navigation - Forward a web-view URL
///
/// - Resume and status:
///   - POST /api/v1/deeplink - Resume from a custom-scheme link
///   - POST /api/v1/requery - Gateway status lookup
///
/// - Callbacks:
///   - POST /callback/ipay88 - iPay88 backend post
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let session_routes = Router::new()
        .route("/", post(handlers::create_session))
        .route("/{handle}", get(handlers::get_session))
        .route("/{handle}/navigation", post(handlers::navigation_event));

    let api_routes = Router::new()
        .nest("/sessions", session_routes)
        .route("/deeplink", post(handlers::deep_link))
        .route("/requery", post(handlers::requery_status));

    // Gateway callbacks (no CORS, raw form body)
    let callback_routes = Router::new().route("/ipay88", post(handlers::ipay88_callback));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes.layer(cors))
        .nest("/callback", callback_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
