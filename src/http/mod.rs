//! HTTP surface: lobby and game routes, shared state, cross-cutting layers.

pub mod game;
pub mod lobby;
pub mod rate_limit;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::http::rate_limit::RateLimiter;
use crate::manager::LobbyManager;
use crate::realtime::hub::UpdateHub;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LobbyManager>,
    pub hub: UpdateHub,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Assemble the application router. Game routes sit behind the rate
/// limiter; everything shares tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
    let game_routes = Router::new()
        .route("/game/{id}/start", post(game::start))
        .route("/game/{id}/status", get(game::status))
        .route("/game/{id}/tile", post(game::place_tile))
        .route("/game/{id}/establish", post(game::establish))
        .route("/game/{id}/buy-stocks", post(game::buy_stocks))
        .route("/game/{id}/end-turn", post(game::end_turn))
        .route("/game/{id}/merger/deal", post(game::merger_deal))
        .route("/game/{id}/merger/end-turn", post(game::merger_end_turn))
        .route("/game/{id}/merger/resolve-conflict", post(game::resolve_conflict))
        .route("/game/{id}/merger/resolve-acquirer", post(game::resolve_acquirer))
        .route("/game/{id}/merger/confirm-defunct", post(game::confirm_defunct))
        .route("/game/{id}/end-merge", post(game::end_merge))
        .route("/game/{id}/end-result", get(game::end_result))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::game_rate_limit));

    Router::new()
        .route("/list", get(lobby::list))
        .route("/host", post(lobby::host))
        .route("/lobby/{id}/players", post(lobby::join))
        .route("/lobby/{id}/status", get(lobby::status))
        .route("/lobby/{id}/leave", post(lobby::leave))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .merge(game_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (lobbies, active_games) = state.manager.counts().await;
    Json(json!({
        "lobbies": lobbies,
        "activeGames": active_games,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 302 redirect; page routes use this for unauthorized and expired access.
pub(crate) fn found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// The username cookie, when present and non-empty.
pub(crate) fn optional_username(jar: &CookieJar) -> Option<String> {
    jar.get("username")
        .map(|c| c.value().trim().to_string())
        .filter(|u| !u.is_empty())
}

/// The username cookie, required for data routes.
pub(crate) fn require_username(jar: &CookieJar) -> Result<String, ApiError> {
    optional_username(jar)
        .ok_or_else(|| ApiError::Unauthorized("missing username cookie".into()))
}
