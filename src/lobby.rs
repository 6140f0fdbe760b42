//! Waiting rooms. A lobby is born on host, grows and shrinks as players
//! join and leave, and expires exactly once when its game starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Bounds on how many players a lobby seats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySize {
    pub min: usize,
    pub max: usize,
}

impl Default for LobbySize {
    fn default() -> Self {
        Self { min: 2, max: 6 }
    }
}

/// A waiting room. The first joiner is the host; the host never rotates,
/// but if the host leaves whoever is now first inherits the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub id: String,
    pub size: LobbySize,
    players: Vec<String>,
    expired: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Snapshot served to a lobby member.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyStatus {
    pub players: Vec<String>,
    pub is_full: bool,
    pub has_expired: bool,
    pub is_possible_to_start: bool,
    pub host: Option<String>,
    #[serde(rename = "self")]
    pub self_username: Option<String>,
}

/// Generate an opaque 16-hex lobby token.
pub fn generate_lobby_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

impl Lobby {
    pub fn new(id: String, size: LobbySize, host: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            size,
            players: vec![host],
            expired: false,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn host(&self) -> Option<&str> {
        self.players.first().map(String::as_str)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.players.iter().any(|p| p == username)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.size.max
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_expired(&self) -> bool {
        self.expired
    }

    /// Add a player, enforcing username uniqueness and the seat cap.
    pub fn join(&mut self, username: String, now: DateTime<Utc>) -> Result<(), ApiError> {
        if self.contains(&username) {
            return Err(ApiError::Conflict(format!(
                "username {username} is already in this lobby"
            )));
        }
        if self.is_full() {
            return Err(ApiError::Unauthorized("lobby is full".into()));
        }
        self.players.push(username);
        self.last_activity_at = now;
        Ok(())
    }

    /// Remove a player. Whoever is left at index 0 is the host.
    pub fn leave(&mut self, username: &str, now: DateTime<Utc>) -> Result<(), ApiError> {
        let before = self.players.len();
        self.players.retain(|p| p != username);
        if self.players.len() == before {
            return Err(ApiError::Unauthorized("not a member of this lobby".into()));
        }
        self.last_activity_at = now;
        Ok(())
    }

    /// One-way flag, set when the game starts.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.expired = true;
        self.last_activity_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn status(&self, for_user: &str) -> LobbyStatus {
        LobbyStatus {
            players: self.players.clone(),
            is_full: self.is_full(),
            has_expired: self.expired,
            is_possible_to_start: self.players.len() >= self.size.min,
            host: self.host().map(str::to_string),
            self_username: self
                .players
                .iter()
                .find(|p| p.as_str() == for_user)
                .cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> Lobby {
        Lobby::new(
            generate_lobby_id(),
            LobbySize { min: 2, max: 3 },
            "alice".into(),
            Utc::now(),
        )
    }

    #[test]
    fn lobby_ids_are_sixteen_hex_chars() {
        let id = generate_lobby_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn join_enforces_uniqueness_and_capacity() {
        let mut lobby = lobby();
        lobby.join("bob".into(), Utc::now()).unwrap();
        assert!(lobby.join("bob".into(), Utc::now()).is_err());
        lobby.join("carol".into(), Utc::now()).unwrap();
        assert!(lobby.is_full());
        assert!(lobby.join("dave".into(), Utc::now()).is_err());
    }

    #[test]
    fn host_is_first_and_inherits_on_leave() {
        let mut lobby = lobby();
        lobby.join("bob".into(), Utc::now()).unwrap();
        assert_eq!(lobby.host(), Some("alice"));
        lobby.leave("alice", Utc::now()).unwrap();
        assert_eq!(lobby.host(), Some("bob"));
    }

    #[test]
    fn status_reports_start_readiness_and_self() {
        let mut lobby = lobby();
        let status = lobby.status("alice");
        assert!(!status.is_possible_to_start);
        assert_eq!(status.self_username.as_deref(), Some("alice"));
        assert_eq!(status.host.as_deref(), Some("alice"));

        lobby.join("bob".into(), Utc::now()).unwrap();
        let status = lobby.status("mallory");
        assert!(status.is_possible_to_start);
        assert!(status.self_username.is_none());
    }

    #[test]
    fn expire_is_one_way() {
        let mut lobby = lobby();
        assert!(!lobby.has_expired());
        lobby.expire(Utc::now());
        assert!(lobby.has_expired());
    }
}
