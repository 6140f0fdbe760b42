//! Voice room membership tables.
//!
//! The relay never inspects WebRTC payloads; these tables exist only to
//! scope forwarding: offer/answer/ICE messages are delivered iff sender and
//! target currently share a room.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::Serialize;

/// Roster entry handed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePeer {
    pub socket_id: String,
    pub username: String,
}

/// Membership tables: room -> members, socket -> room. Both sides are kept
/// in step under this type so they cannot drift.
#[derive(Default)]
pub struct VoiceRegistry {
    rooms: DashMap<String, HashMap<String, String>>,
    member_rooms: DashMap<String, String>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `socket_id` to `room`, leaving any previous room first.
    /// Returns the roster as it was before the join.
    pub fn join(&self, room: &str, socket_id: &str, username: &str) -> Vec<VoicePeer> {
        self.leave(socket_id);
        let existing = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .iter()
            .map(|(id, name)| VoicePeer { socket_id: id.clone(), username: name.clone() })
            .collect();
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.insert(socket_id.to_string(), username.to_string());
        }
        self.member_rooms.insert(socket_id.to_string(), room.to_string());
        existing
    }

    /// Remove `socket_id` from its room. Returns (room, username) when the
    /// socket was a member somewhere.
    pub fn leave(&self, socket_id: &str) -> Option<(String, String)> {
        let (_, room) = self.member_rooms.remove(socket_id)?;
        let mut username = None;
        let mut now_empty = false;
        if let Some(mut members) = self.rooms.get_mut(&room) {
            username = members.remove(socket_id);
            now_empty = members.is_empty();
        }
        if now_empty {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
        username.map(|name| (room, name))
    }

    pub fn room_of(&self, socket_id: &str) -> Option<String> {
        self.member_rooms.get(socket_id).map(|room| room.clone())
    }

    /// Relay guard: both endpoints must share a voice room.
    pub fn share_room(&self, a: &str, b: &str) -> bool {
        match (self.room_of(a), self.room_of(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    pub fn username_of(&self, socket_id: &str) -> Option<String> {
        let room = self.room_of(socket_id)?;
        self.rooms.get(&room)?.get(socket_id).cloned()
    }
}
