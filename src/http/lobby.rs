//! Lobby routes: listing, hosting, joining, status, leaving.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::http::{found, optional_username, require_username, AppState};
use crate::lobby::LobbySize;

#[derive(Debug, Deserialize)]
pub struct UsernameBody {
    pub username: Option<String>,
}

fn valid_username(body: UsernameBody) -> Result<String, ApiError> {
    body.username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Validation("missing or empty username".into()))
}

/// Cookies carried by lobby members: identity plus an advisory lobby id.
fn identity_cookies(jar: CookieJar, username: &str, lobby_id: &str) -> CookieJar {
    jar.add(Cookie::build(("username", username.to_string())).path("/"))
        .add(Cookie::build(("lobbyId", lobby_id.to_string())).path("/"))
}

fn clear_identity_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(("username", "")).path("/"))
        .remove(Cookie::build(("lobbyId", "")).path("/"))
}

/// GET /list
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lobbies = state.manager.lobby_summaries().await;
    Json(json!({ "lobbies": lobbies }))
}

/// POST /host
pub async fn host(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<UsernameBody>,
) -> Result<Response, ApiError> {
    let username = valid_username(body)?;
    let lobby_id = state
        .manager
        .create_lobby(LobbySize::default(), username.clone())
        .await?;
    state
        .hub
        .lobby_list_changed(state.manager.lobby_summaries().await)
        .await;
    info!(lobby = %lobby_id, %username, "lobby hosted");
    let jar = identity_cookies(jar, &username, &lobby_id);
    Ok((StatusCode::CREATED, jar, Json(json!({ "lobbyId": lobby_id }))).into_response())
}

/// POST /lobby/{id}/players
pub async fn join(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<UsernameBody>,
) -> Result<Response, ApiError> {
    let username = valid_username(body)?;
    let record = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no lobby {id}")))?;
    {
        let mut record = record.lock().await;
        if record.lobby.has_expired() {
            return Err(ApiError::Validation("game already started".into()));
        }
        record.lobby.join(username.clone(), state.manager.now())?;
        state.hub.lobby_updated(&id).await;
    }
    state
        .hub
        .lobby_list_changed(state.manager.lobby_summaries().await)
        .await;
    info!(lobby = %id, %username, "player joined lobby");
    let jar = identity_cookies(jar, &username, &id);
    Ok((jar, found(&format!("/lobby/{id}"))).into_response())
}

/// GET /lobby/{id}/status
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    let Some(username) = optional_username(&jar) else {
        return found("/");
    };
    let Some(record) = state.manager.get(&id) else {
        return found("/");
    };
    let record = record.lock().await;
    if !record.lobby.contains(&username) {
        return found("/");
    }
    Json(record.lobby.status(&username)).into_response()
}

/// POST /lobby/{id}/leave
pub async fn leave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let username = require_username(&jar)?;
    let record = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no lobby {id}")))?;
    let now_empty = {
        let mut record = record.lock().await;
        if record.lobby.has_expired() {
            return Err(ApiError::Validation("cannot leave after the game has started".into()));
        }
        record.lobby.leave(&username, state.manager.now())?;
        state.hub.lobby_updated(&id).await;
        record.lobby.is_empty()
    };
    if now_empty {
        state.manager.remove(&id);
    }
    state
        .hub
        .lobby_list_changed(state.manager.lobby_summaries().await)
        .await;
    info!(lobby = %id, %username, "player left lobby");
    let jar = clear_identity_cookies(jar);
    Ok((jar, Json(json!({ "success": true }))).into_response())
}
