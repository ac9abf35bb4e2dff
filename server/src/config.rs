//! Server configuration, loaded from an optional TOML file and overridden by
//! command-line flags.

use crate::error::ConfigError;
use serde::Deserialize;
use shared::{DEFAULT_CONNECTION_WINDOW_SECS, DEFAULT_HINT_TIMEOUT_SECS, DEFAULT_PORT};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub game: GameConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            game: GameConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Round timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub hint_timeout_secs: u64,
    pub connection_window_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            hint_timeout_secs: DEFAULT_HINT_TIMEOUT_SECS,
            connection_window_secs: DEFAULT_CONNECTION_WINDOW_SECS,
        }
    }
}

impl GameConfig {
    pub fn hint_timeout(&self) -> Duration {
        Duration::from_secs(self.hint_timeout_secs)
    }

    pub fn connection_window(&self) -> Duration {
        Duration::from_secs(self.connection_window_secs)
    }
}

/// Connection caps and buffer sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Outbound frames queued per player before they are evicted as too slow.
    pub player_buffer: usize,
    pub max_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            player_buffer: 256,
            max_connections: 64,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.game.hint_timeout_secs == 0 {
            return Err(ConfigError::Zero("game.hint_timeout_secs"));
        }
        if self.game.connection_window_secs == 0 {
            return Err(ConfigError::Zero("game.connection_window_secs"));
        }
        if self.limits.player_buffer == 0 {
            return Err(ConfigError::Zero("limits.player_buffer"));
        }
        if self.limits.max_connections == 0 {
            return Err(ConfigError::Zero("limits.max_connections"));
        }
        if self.game.connection_window_secs > self.game.hint_timeout_secs {
            log::warn!(
                "connection window ({}s) is longer than the hint timeout ({}s)",
                self.game.connection_window_secs,
                self.game.hint_timeout_secs
            );
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.listen_addr.clone()))
    }
}
