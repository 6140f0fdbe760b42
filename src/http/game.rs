//! Game routes: every engine mutation flows through here, serialized on the
//! lobby record lock. Broadcast ticks are emitted while the lock is still
//! held so room delivery follows mutation order.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::game::board::Position;
use crate::game::corporation::Chain;
use crate::game::engine::Game;
use crate::game::market::BuyOrder;
use crate::game::tiles::RandomShuffler;
use crate::http::{found, optional_username, require_username, AppState};

#[derive(Debug, Deserialize)]
pub struct TileBody {
    pub x: u8,
    pub y: u8,
}

#[derive(Debug, Deserialize)]
pub struct EstablishBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BuyEntry {
    pub name: String,
    pub price: u32,
}

#[derive(Debug, Deserialize)]
pub struct DealBody {
    pub sell: u8,
    pub trade: u8,
}

#[derive(Debug, Deserialize)]
pub struct ResolveConflictBody {
    pub acquirer: String,
    pub defunct: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAcquirerBody {
    pub acquirer: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmDefunctBody {
    pub defunct: String,
}

fn ok_body() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

/// Common shape of a game mutation: look up the record, lock it, run the
/// engine action, stamp activity, tick the game room.
async fn mutate_game<F>(
    state: &AppState,
    id: &str,
    action: F,
) -> Result<Json<serde_json::Value>, ApiError>
where
    F: FnOnce(&mut Game) -> Result<(), ApiError>,
{
    let record = state
        .manager
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("no game {id}")))?;
    let mut record = record.lock().await;
    let now = state.manager.now();
    let game = record
        .game
        .as_mut()
        .ok_or_else(|| ApiError::NotFound("game not started".into()))?;
    action(game)?;
    record.touch_game(now);
    state.hub.game_updated(id).await;
    Ok(ok_body())
}

/// POST /game/{id}/start
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let record = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no lobby {id}")))?;
    let players = {
        let record = record.lock().await;
        if record.game.is_some() || record.lobby.has_expired() {
            return Err(ApiError::Validation("game already started".into()));
        }
        if record.lobby.host() != Some(username.as_str()) {
            return Err(ApiError::Forbidden("only the host can start the game".into()));
        }
        if record.lobby.players().len() < record.lobby.size.min {
            return Err(ApiError::Validation("not enough players".into()));
        }
        record.lobby.players().to_vec()
    };
    let game = Game::new(&players, &mut RandomShuffler)?;
    state.manager.attach_game(&id, game).await?;
    state.hub.lobby_updated(&id).await;
    state
        .hub
        .lobby_list_changed(state.manager.lobby_summaries().await)
        .await;
    state.hub.game_updated(&id).await;
    info!(lobby = %id, players = players.len(), "game launched");
    Ok(ok_body())
}

/// GET /game/{id}/status
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    let Some(username) = optional_username(&jar) else {
        return found("/");
    };
    let Some(record) = state.manager.get(&id) else {
        return ApiError::NotFound(format!("no game {id}")).into_response();
    };
    let record = record.lock().await;
    let Some(game) = record.game.as_ref() else {
        return ApiError::NotFound("game not started".into()).into_response();
    };
    if !game.is_participant(&username) {
        return found("/");
    }
    Json(game.snapshot_for(Some(&username))).into_response()
}

/// POST /game/{id}/tile
pub async fn place_tile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<TileBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let pos = Position::new(body.x, body.y)?;
    mutate_game(&state, &id, |game| {
        game.place_tile(&username, pos)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/establish
pub async fn establish(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<EstablishBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let chain = Chain::from_wire(&body.name)?;
    mutate_game(&state, &id, |game| {
        game.establish(&username, chain)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/buy-stocks
///
/// Batches longer than three entries are truncated here, at the router
/// boundary; unknown corporation names are skipped like any other
/// unsatisfiable purchase.
pub async fn buy_stocks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<Vec<BuyEntry>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let orders: Vec<BuyOrder> = body
        .iter()
        .take(3)
        .filter_map(|entry| {
            Chain::from_wire(&entry.name)
                .ok()
                .map(|chain| BuyOrder { chain, price: entry.price })
        })
        .collect();
    mutate_game(&state, &id, |game| {
        game.buy_stocks(&username, &orders)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/end-turn
pub async fn end_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let record = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no game {id}")))?;
    let mut record = record.lock().await;
    let now = state.manager.now();
    let game = record
        .game
        .as_mut()
        .ok_or_else(|| ApiError::NotFound("game not started".into()))?;
    let outcome = game.end_turn(&username)?;
    record.touch_game(now);
    match outcome {
        Some(result) => {
            record.mark_finished(now);
            state.hub.game_updated(&id).await;
            state.hub.game_ended(&id, &result).await;
            info!(lobby = %id, "game finished");
        }
        None => {
            state.hub.game_updated(&id).await;
        }
    }
    Ok(ok_body())
}

/// POST /game/{id}/merger/deal
pub async fn merger_deal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<DealBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    mutate_game(&state, &id, |game| {
        game.merger_deal(&username, body.sell, body.trade)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/merger/end-turn
pub async fn merger_end_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    mutate_game(&state, &id, |game| {
        game.merger_end_turn(&username)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/merger/resolve-conflict
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<ResolveConflictBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let acquirer = Chain::from_wire(&body.acquirer)?;
    let defunct = Chain::from_wire(&body.defunct)?;
    mutate_game(&state, &id, |game| {
        game.resolve_conflict(&username, acquirer, defunct)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/merger/resolve-acquirer
pub async fn resolve_acquirer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<ResolveAcquirerBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let acquirer = Chain::from_wire(&body.acquirer)?;
    mutate_game(&state, &id, |game| {
        game.resolve_acquirer(&username, acquirer)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/merger/confirm-defunct
pub async fn confirm_defunct(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(body): Json<ConfirmDefunctBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&jar)?;
    let defunct = Chain::from_wire(&body.defunct)?;
    mutate_game(&state, &id, |game| {
        game.confirm_defunct(&username, defunct)?;
        Ok(())
    })
    .await
}

/// POST /game/{id}/end-merge
pub async fn end_merge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _username = require_username(&jar)?;
    mutate_game(&state, &id, |game| {
        game.end_merge()?;
        Ok(())
    })
    .await
}

/// GET /game/{id}/end-result
pub async fn end_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::game::engine::GameResult>, ApiError> {
    let record = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no game {id}")))?;
    let record = record.lock().await;
    let game = record
        .game
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("game not started".into()))?;
    let result = game
        .end_result()
        .cloned()
        .ok_or_else(|| ApiError::NotFound("game is not over".into()))?;
    Ok(Json(result))
}
