use axum::Router;
use tower_http::services::ServeDir;

use crate::auth;
use crate::state::AppState;
use crate::turn;
use crate::ws::handler as ws_handler;

/// Build the axum Router: login, ICE config, the WebSocket endpoint, a
/// health check, and an optional static frontend fallback.
pub fn build_router(state: AppState, static_dir: Option<&str>) -> Router {
    let api_routes = Router::new()
        .route("/api/login", axum::routing::post(auth::login))
        .route("/api/ice-config", axum::routing::get(turn::ice_config));

    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    let mut router = Router::new().merge(api_routes).merge(ws_routes).merge(health);
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router.with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
