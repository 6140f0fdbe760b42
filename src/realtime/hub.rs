//! Typed fan-out over the realtime namespaces.
//!
//! Update events are deliberately content-free ticks: clients react by
//! re-fetching their per-user status, so no hidden information ever rides
//! a broadcast. Emits happen while the caller still holds the record lock,
//! which keeps per-room delivery in mutation order.

use serde_json::json;
use socketioxide::SocketIo;
use tracing::warn;

use crate::game::engine::GameResult;
use crate::manager::LobbySummary;

pub const LOBBY_NAMESPACE: &str = "/lobby";
pub const GAME_NAMESPACE: &str = "/game";
pub const VOICE_NAMESPACE: &str = "/voice";

/// Room key for a lobby's waiting-room channel.
pub fn lobby_room(lobby_id: &str) -> String {
    format!("lobby:{lobby_id}")
}

/// Room key for a running game's channel.
pub fn game_room(lobby_id: &str) -> String {
    format!("game:{lobby_id}")
}

/// Broadcast half of the fan-out layer. Cheap to clone; handlers keep one
/// in the shared state.
#[derive(Clone)]
pub struct UpdateHub {
    io: SocketIo,
}

impl UpdateHub {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }

    /// Lobby-list delta to every `/lobby` socket.
    pub async fn lobby_list_changed(&self, lobbies: Vec<LobbySummary>) {
        if let Some(ns) = self.io.of(LOBBY_NAMESPACE) {
            if let Err(e) = ns.emit("lobbyListUpdate", &json!({ "lobbies": lobbies })).await {
                warn!("lobbyListUpdate broadcast failed: {e}");
            }
        }
    }

    /// Tick to the waiting room of one lobby.
    pub async fn lobby_updated(&self, lobby_id: &str) {
        if let Some(ns) = self.io.of(LOBBY_NAMESPACE) {
            if let Err(e) = ns.to(lobby_room(lobby_id)).emit("lobbyUpdate", &json!({})).await {
                warn!(lobby = %lobby_id, "lobbyUpdate broadcast failed: {e}");
            }
        }
    }

    /// Tick to the game room of one lobby.
    pub async fn game_updated(&self, lobby_id: &str) {
        if let Some(ns) = self.io.of(GAME_NAMESPACE) {
            if let Err(e) = ns.to(game_room(lobby_id)).emit("gameUpdate", &json!({})).await {
                warn!(lobby = %lobby_id, "gameUpdate broadcast failed: {e}");
            }
        }
    }

    /// Final standings to the game room.
    pub async fn game_ended(&self, lobby_id: &str, result: &GameResult) {
        if let Some(ns) = self.io.of(GAME_NAMESPACE) {
            if let Err(e) = ns
                .to(game_room(lobby_id))
                .emit("gameEnd", &json!({ "result": result }))
                .await
            {
                warn!(lobby = %lobby_id, "gameEnd broadcast failed: {e}");
            }
        }
    }
}
