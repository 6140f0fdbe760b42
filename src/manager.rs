//! Process-wide lobby registry: capacity caps, per-record locking, and the
//! background reaper that reclaims idle rooms and finished games.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::LimitSettings;
use crate::error::ApiError;
use crate::game::engine::Game;
use crate::lobby::{generate_lobby_id, Lobby, LobbySize};
use crate::realtime::hub::UpdateHub;

/// Time source, injected so tests can drive the reaper deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One lobby and, once started, its game. The record is the unit of mutual
/// exclusion: every mutation of the lobby or game serializes on its lock.
#[derive(Debug)]
pub struct LobbyRecord {
    pub lobby: Lobby,
    pub game: Option<Game>,
    pub game_started_at: Option<DateTime<Utc>>,
    pub game_last_activity_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl LobbyRecord {
    fn new(lobby: Lobby) -> Self {
        Self {
            lobby,
            game: None,
            game_started_at: None,
            game_last_activity_at: None,
            finished: false,
            finished_at: None,
        }
    }

    /// Record activity on the running game.
    pub fn touch_game(&mut self, now: DateTime<Utc>) {
        self.game_last_activity_at = Some(now);
    }

    /// Mark the game finished; the reaper reclaims it after the retention
    /// window.
    pub fn mark_finished(&mut self, now: DateTime<Utc>) {
        self.finished = true;
        self.finished_at = Some(now);
    }
}

pub type SharedRecord = Arc<Mutex<LobbyRecord>>;

/// Row of the public lobby list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: String,
    pub host: Option<String>,
    pub player_count: usize,
    pub max_players: usize,
    pub is_full: bool,
    pub created_at: DateTime<Utc>,
}

/// The registry. The map itself is independently lockable from the records
/// it holds, so handler lookups never contend with the reaper's sweep more
/// than a shard lock at a time.
pub struct LobbyManager {
    records: DashMap<String, SharedRecord>,
    limits: LimitSettings,
    clock: Arc<dyn Clock>,
}

impl LobbyManager {
    pub fn new(limits: LimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self { records: DashMap::new(), limits, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn limits(&self) -> &LimitSettings {
        &self.limits
    }

    fn snapshot_records(&self) -> Vec<(String, SharedRecord)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Create a lobby with `host` seated, enforcing MAX_LOBBIES over
    /// non-expired lobbies.
    pub async fn create_lobby(&self, size: LobbySize, host: String) -> Result<String, ApiError> {
        let mut open_lobbies = 0;
        for (_, record) in self.snapshot_records() {
            let record = record.lock().await;
            if !record.lobby.has_expired() {
                open_lobbies += 1;
            }
        }
        if open_lobbies >= self.limits.max_lobbies {
            return Err(ApiError::Capacity("lobby capacity reached".into()));
        }

        let now = self.now();
        let id = generate_lobby_id();
        let lobby = Lobby::new(id.clone(), size, host, now);
        self.records
            .insert(id.clone(), Arc::new(Mutex::new(LobbyRecord::new(lobby))));
        info!(lobby = %id, "lobby created");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<SharedRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Attach a started game to its lobby, enforcing MAX_ACTIVE_GAMES over
    /// unfinished games. The lobby expires as part of the start.
    pub async fn attach_game(&self, id: &str, game: Game) -> Result<(), ApiError> {
        let mut active_games = 0;
        for (_, record) in self.snapshot_records() {
            let record = record.lock().await;
            if record.game.is_some() && !record.finished {
                active_games += 1;
            }
        }
        if active_games >= self.limits.max_active_games {
            return Err(ApiError::Capacity("too many active games".into()));
        }

        let record = self
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("no lobby {id}")))?;
        let mut record = record.lock().await;
        if record.game.is_some() {
            return Err(ApiError::Validation("game already started".into()));
        }
        let now = self.now();
        record.lobby.expire(now);
        record.game = Some(game);
        record.game_started_at = Some(now);
        record.game_last_activity_at = Some(now);
        info!(lobby = %id, "game started");
        Ok(())
    }

    /// Delete a record outright (used when the last player leaves).
    pub fn remove(&self, id: &str) {
        self.records.remove(id);
    }

    /// Non-expired lobbies, newest first.
    pub async fn lobby_summaries(&self) -> Vec<LobbySummary> {
        let mut summaries = Vec::new();
        for (id, record) in self.snapshot_records() {
            let record = record.lock().await;
            if record.lobby.has_expired() {
                continue;
            }
            summaries.push(LobbySummary {
                id,
                host: record.lobby.host().map(str::to_string),
                player_count: record.lobby.players().len(),
                max_players: record.lobby.size.max,
                is_full: record.lobby.is_full(),
                created_at: record.lobby.created_at,
            });
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Counts for the stats endpoint: (open lobbies, unfinished games).
    pub async fn counts(&self) -> (usize, usize) {
        let mut lobbies = 0;
        let mut games = 0;
        for (_, record) in self.snapshot_records() {
            let record = record.lock().await;
            if !record.lobby.has_expired() {
                lobbies += 1;
            }
            if record.game.is_some() && !record.finished {
                games += 1;
            }
        }
        (lobbies, games)
    }

    /// One reaper pass. Records busy with gameplay are skipped via
    /// `try_lock` and revisited next interval. Returns the ids deleted.
    pub async fn sweep(&self) -> Vec<String> {
        let now = self.now();
        let mut removed = Vec::new();
        for (id, record) in self.snapshot_records() {
            let Ok(record_guard) = record.try_lock() else {
                debug!(lobby = %id, "reaper skipping busy record");
                continue;
            };
            let reclaim = if record_guard.lobby.is_empty() {
                Some("empty lobby")
            } else if !record_guard.lobby.has_expired()
                && now - record_guard.lobby.last_activity_at > self.limits.lobby_idle_timeout()
            {
                Some("idle lobby")
            } else if record_guard.finished
                && record_guard
                    .finished_at
                    .is_some_and(|at| now - at > self.limits.finished_game_retention())
            {
                Some("finished game past retention")
            } else if record_guard.lobby.has_expired()
                && record_guard.game.is_some()
                && !record_guard.finished
                && record_guard
                    .game_last_activity_at
                    .is_some_and(|at| now - at > self.limits.game_idle_timeout())
            {
                Some("idle game")
            } else {
                None
            };
            drop(record_guard);
            if let Some(reason) = reclaim {
                self.records.remove(&id);
                info!(lobby = %id, reason, "reaper reclaimed record");
                removed.push(id);
            }
        }
        removed
    }
}

/// Run the reaper until shutdown. One iteration completes before the next
/// starts; the interval is independent of request timeouts.
pub fn spawn_reaper(
    manager: Arc<LobbyManager>,
    hub: UpdateHub,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let period = std::time::Duration::from_secs(manager.limits.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so a fresh boot does not
        // sweep before anything exists.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = manager.sweep().await;
                    if !removed.is_empty() {
                        hub.lobby_list_changed(manager.lobby_summaries().await).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("reaper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock the tests can advance by hand.
    struct TestClock {
        offset_secs: AtomicI64,
        base: DateTime<Utc>,
    }

    impl TestClock {
        fn new() -> Self {
            Self { offset_secs: AtomicI64::new(0), base: Utc::now() }
        }

        fn advance_secs(&self, secs: i64) {
            self.offset_secs.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + chrono::Duration::seconds(self.offset_secs.load(Ordering::SeqCst))
        }
    }

    fn manager_with_clock() -> (Arc<LobbyManager>, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let manager = Arc::new(LobbyManager::new(
            LimitSettings { max_lobbies: 2, max_active_games: 1, ..LimitSettings::default() },
            clock.clone(),
        ));
        (manager, clock)
    }

    fn size() -> LobbySize {
        LobbySize { min: 2, max: 4 }
    }

    #[tokio::test]
    async fn create_lobby_enforces_capacity() {
        let (manager, _) = manager_with_clock();
        let first = manager.create_lobby(size(), "alice".into()).await.unwrap();
        manager.create_lobby(size(), "bob".into()).await.unwrap();
        let err = manager.create_lobby(size(), "carol".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Capacity(_)));
        // Existing lobbies are unaffected.
        assert!(manager.get(&first).is_some());
        assert_eq!(manager.lobby_summaries().await.len(), 2);
    }

    #[tokio::test]
    async fn summaries_exclude_expired_and_sort_newest_first() {
        let (manager, clock) = manager_with_clock();
        let older = manager.create_lobby(size(), "alice".into()).await.unwrap();
        clock.advance_secs(10);
        let newer = manager.create_lobby(size(), "bob".into()).await.unwrap();

        let summaries = manager.lobby_summaries().await;
        assert_eq!(summaries[0].id, newer);
        assert_eq!(summaries[1].id, older);

        let record = manager.get(&older).unwrap();
        record.lock().await.lobby.expire(clock.now());
        let summaries = manager.lobby_summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, newer);
    }

    #[tokio::test]
    async fn reaper_deletes_idle_and_empty_lobbies() {
        let (manager, clock) = manager_with_clock();
        let idle = manager.create_lobby(size(), "alice".into()).await.unwrap();
        clock.advance_secs(60);
        let fresh = manager.create_lobby(size(), "bob".into()).await.unwrap();

        // Not idle long enough yet.
        assert!(manager.sweep().await.is_empty());

        clock.advance_secs(30 * 60 - 30);
        let removed = manager.sweep().await;
        assert_eq!(removed, vec![idle]);
        assert!(manager.get(&fresh).is_some());

        let record = manager.get(&fresh).unwrap();
        record.lock().await.lobby.leave("bob", clock.now()).unwrap();
        let removed = manager.sweep().await;
        assert_eq!(removed, vec![fresh]);
    }

    #[tokio::test]
    async fn reaper_skips_locked_records() {
        let (manager, clock) = manager_with_clock();
        let id = manager.create_lobby(size(), "alice".into()).await.unwrap();
        clock.advance_secs(31 * 60);
        let record = manager.get(&id).unwrap();
        let guard = record.lock().await;
        assert!(manager.sweep().await.is_empty());
        drop(guard);
        assert_eq!(manager.sweep().await, vec![id]);
    }

    #[tokio::test]
    async fn reaper_reclaims_finished_games_after_retention() {
        let (manager, clock) = manager_with_clock();
        let id = manager.create_lobby(size(), "alice".into()).await.unwrap();
        {
            let record = manager.get(&id).unwrap();
            let mut record = record.lock().await;
            record.lobby.join("bob".into(), clock.now()).unwrap();
            record.lobby.expire(clock.now());
            record.mark_finished(clock.now());
        }
        clock.advance_secs(4 * 60);
        assert!(manager.sweep().await.is_empty());
        clock.advance_secs(2 * 60);
        assert_eq!(manager.sweep().await, vec![id]);
    }
}
