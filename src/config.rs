//! Server configuration: TOML file with environment variable overrides.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerSettings,
    pub limits: LimitSettings,
    pub rate_limiting: RateLimitSettings,
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind, "IP:PORT".
    pub bind_address: String,
}

/// Capacity caps and reclamation timers for the lobby registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Maximum concurrent non-expired lobbies.
    pub max_lobbies: usize,
    /// Maximum concurrent unfinished games.
    pub max_active_games: usize,
    /// Idle seconds before a waiting lobby is reclaimed.
    pub lobby_idle_timeout_secs: u64,
    /// Idle seconds before a running game is reclaimed.
    pub game_idle_timeout_secs: u64,
    /// Seconds a finished game lingers for result reads.
    pub finished_game_retention_secs: u64,
    /// Seconds between reaper sweeps.
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// Request budget per second for `/game/*` routes, per client identity.
    pub game_requests_per_second: u32,
    /// Identities exempt from limiting.
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter: "trace", "debug", "info", "warn", "error".
    pub level: String,
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings { bind_address: "0.0.0.0:8080".to_string() },
            limits: LimitSettings::default(),
            rate_limiting: RateLimitSettings {
                enabled: true,
                game_requests_per_second: 20,
                whitelist: Vec::new(),
            },
            logging: Some(LoggingSettings { level: "info".to_string(), json_format: false }),
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_lobbies: 200,
            max_active_games: 100,
            lobby_idle_timeout_secs: 30 * 60,
            game_idle_timeout_secs: 2 * 60 * 60,
            finished_game_retention_secs: 5 * 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl LimitSettings {
    pub fn lobby_idle_timeout(&self) -> Duration {
        Duration::seconds(self.lobby_idle_timeout_secs as i64)
    }

    pub fn game_idle_timeout(&self) -> Duration {
        Duration::seconds(self.game_idle_timeout_secs as i64)
    }

    pub fn finished_game_retention(&self) -> Duration {
        Duration::seconds(self.finished_game_retention_secs as i64)
    }
}

impl Config {
    /// Load a configuration file and fold in environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: Config =
            toml::from_str(&config_str).context("Failed to parse configuration file")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `PORT` rebinds the listen port; `BOARDROOM_BIND` replaces the whole
    /// listen address.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("BOARDROOM_BIND") {
            self.server.bind_address = bind;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = self
                    .server
                    .bind_address
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.server.bind_address = format!("{host}:{port}");
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .context("Invalid bind_address format")?;
        if self.limits.max_lobbies == 0 {
            return Err(anyhow::anyhow!("max_lobbies must be greater than 0"));
        }
        if self.limits.max_active_games == 0 {
            return Err(anyhow::anyhow!("max_active_games must be greater than 0"));
        }
        if self.limits.cleanup_interval_secs == 0 {
            return Err(anyhow::anyhow!("cleanup_interval_secs must be greater than 0"));
        }
        if self.rate_limiting.enabled && self.rate_limiting.game_requests_per_second == 0 {
            return Err(anyhow::anyhow!("game_requests_per_second must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.limits.max_lobbies, 200);
        assert_eq!(config.limits.max_active_games, 100);
        assert_eq!(config.limits.lobby_idle_timeout_secs, 1_800);
        assert_eq!(config.limits.game_idle_timeout_secs, 7_200);
        assert_eq!(config.limits.finished_game_retention_secs, 300);
        assert_eq!(config.limits.cleanup_interval_secs, 60);
        assert_eq!(config.rate_limiting.game_requests_per_second, 20);
        config.validate().unwrap();
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.bind_address, config.server.bind_address);
        assert_eq!(parsed.limits.max_lobbies, config.limits.max_lobbies);
    }

    #[test]
    fn rejects_bad_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "not-an-address".into();
        assert!(config.validate().is_err());
    }
}
