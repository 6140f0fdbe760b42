//! Realtime namespaces: `/lobby`, `/game`, `/voice`.
//!
//! Every connection authenticates at handshake with `{username, lobbyId?}`;
//! a missing username is fatal to the connection. Room membership is
//! tracked in dependency-injected tables so the reaper, handlers, and
//! relays never consult socket internals.

pub mod hub;
pub mod voice;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use socketioxide::extract::{AckSender, Data, SocketRef, TryData};
use socketioxide::layer::SocketIoLayer;
use socketioxide::socket::Sid;
use socketioxide::SocketIo;
use tracing::debug;

use crate::error::ApiError;
use crate::realtime::voice::VoiceRegistry;

/// Handshake credentials presented by every namespace connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAuth {
    pub username: Option<String>,
    pub lobby_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomPayload {
    lobby_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceJoinPayload {
    room_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceJoinAck {
    socket_id: String,
    room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload {
    target_id: String,
    payload: serde_json::Value,
}

/// Build the socket.io layer with all three namespaces registered.
pub fn build(voice: Arc<VoiceRegistry>) -> (SocketIoLayer, SocketIo) {
    let (layer, io) = SocketIo::new_layer();
    register_room_namespace(&io, hub::LOBBY_NAMESPACE, "joinLobby", "leaveLobby", hub::lobby_room);
    register_room_namespace(&io, hub::GAME_NAMESPACE, "joinGame", "leaveGame", hub::game_room);
    register_voice_namespace(&io, voice);
    (layer, io)
}

/// Enforce the handshake contract. Returns the trimmed username, or emits a
/// fatal error and disconnects.
fn authenticate(socket: &SocketRef, auth: Option<HandshakeAuth>) -> Option<String> {
    let username = auth
        .and_then(|a| a.username)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    match username {
        Some(username) => Some(username),
        None => {
            let err = ApiError::Unauthorized("handshake requires a username".into());
            socket.emit("error", &err.payload()).ok();
            socket.clone().disconnect().ok();
            None
        }
    }
}

/// `/lobby` and `/game` are structurally identical: join-room, leave-room,
/// and server-pushed ticks. Membership is keyed by lobby id.
fn register_room_namespace(
    io: &SocketIo,
    path: &'static str,
    join_event: &'static str,
    leave_event: &'static str,
    room_key: fn(&str) -> String,
) {
    let directory: Arc<DashMap<Sid, String>> = Arc::new(DashMap::new());
    io.ns(path, move |socket: SocketRef, TryData(auth): TryData<HandshakeAuth>| {
        let directory = directory.clone();
        async move {
            let Some(username) = authenticate(&socket, auth.ok()) else {
                return;
            };
            debug!(namespace = path, %username, socket = %socket.id, "socket connected");

            {
                let directory = directory.clone();
                socket.on(
                    join_event,
                    move |socket: SocketRef, Data(payload): Data<RoomPayload>| {
                        let directory = directory.clone();
                        async move {
                            let room = room_key(&payload.lobby_id);
                            if let Some(previous) = directory.insert(socket.id, room.clone()) {
                                if previous != room {
                                    socket.leave(previous);
                                }
                            }
                            socket.join(room);
                        }
                    },
                );
            }
            {
                let directory = directory.clone();
                socket.on(leave_event, move |socket: SocketRef| {
                    let directory = directory.clone();
                    async move {
                        if let Some((_, room)) = directory.remove(&socket.id) {
                            socket.leave(room);
                        }
                    }
                });
            }
            {
                let directory = directory.clone();
                socket.on_disconnect(move |socket: SocketRef| {
                    let directory = directory.clone();
                    async move {
                        directory.remove(&socket.id);
                    }
                });
            }
        }
    });
}

/// `/voice`: room join with acknowledged identity, addressed WebRTC relay,
/// and membership notifications. Payloads are forwarded untouched.
fn register_voice_namespace(io: &SocketIo, registry: Arc<VoiceRegistry>) {
    io.ns(
        hub::VOICE_NAMESPACE,
        move |socket: SocketRef, TryData(auth): TryData<HandshakeAuth>| {
            let registry = registry.clone();
            async move {
                let Some(username) = authenticate(&socket, auth.ok()) else {
                    return;
                };
                debug!(namespace = "/voice", %username, socket = %socket.id, "socket connected");

                {
                    let registry = registry.clone();
                    let username = username.clone();
                    socket.on(
                        "voice:join",
                        move |socket: SocketRef,
                              Data(payload): Data<VoiceJoinPayload>,
                              ack: AckSender| {
                            let registry = registry.clone();
                            let username = username.clone();
                            async move {
                                let sid = socket.id.to_string();
                                if let Some(previous) = registry.room_of(&sid) {
                                    socket.leave(previous);
                                }
                                let roster = registry.join(&payload.room_id, &sid, &username);
                                socket.join(payload.room_id.clone());
                                ack.send(&VoiceJoinAck {
                                    socket_id: sid.clone(),
                                    room_id: payload.room_id.clone(),
                                })
                                .ok();
                                socket.emit("voice:room-users", &json!({ "users": roster })).ok();
                                socket
                                    .to(payload.room_id.clone())
                                    .emit(
                                        "voice:user-joined",
                                        &json!({ "socketId": sid, "username": username }),
                                    )
                                    .await
                                    .ok();
                            }
                        },
                    );
                }

                for event in ["voice:offer", "voice:answer", "voice:ice"] {
                    let registry = registry.clone();
                    socket.on(
                        event,
                        move |socket: SocketRef, Data(relay): Data<RelayPayload>| {
                            let registry = registry.clone();
                            async move {
                                let sender = socket.id.to_string();
                                if !registry.share_room(&sender, &relay.target_id) {
                                    let err = ApiError::Unauthorized(
                                        "target is not in your voice room".into(),
                                    );
                                    socket.emit("error", &err.payload()).ok();
                                    return;
                                }
                                let username = registry.username_of(&sender);
                                socket
                                    .to(relay.target_id.clone())
                                    .emit(
                                        event,
                                        &json!({
                                            "from": sender,
                                            "username": username,
                                            "payload": relay.payload,
                                        }),
                                    )
                                    .await
                                    .ok();
                            }
                        },
                    );
                }

                {
                    let registry = registry.clone();
                    socket.on("voice:leave", move |socket: SocketRef| {
                        let registry = registry.clone();
                        async move {
                            voice_departure(&registry, &socket).await;
                        }
                    });
                }
                {
                    let registry = registry.clone();
                    socket.on_disconnect(move |socket: SocketRef| {
                        let registry = registry.clone();
                        async move {
                            voice_departure(&registry, &socket).await;
                        }
                    });
                }
            }
        },
    );
}

/// Shared tail of explicit leave and disconnect.
async fn voice_departure(registry: &VoiceRegistry, socket: &SocketRef) {
    let sid = socket.id.to_string();
    if let Some((room, username)) = registry.leave(&sid) {
        socket.leave(room.clone());
        socket
            .to(room)
            .emit("voice:user-left", &json!({ "socketId": sid, "username": username }))
            .await
            .ok();
    }
}
