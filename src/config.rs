//! Configuration management for the gambit match engine.
//!
//! Centralized configuration with validation, defaults, and environment
//! variable support.

use crate::errors::{EngineError, EngineResult};
use crate::model::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GambitConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Starting clock per side, in seconds.
    pub initial_clock_secs: i64,
    /// Period of the per-match clock tick loop.
    pub tick_interval_ms: u64,
    /// Capacity of each match's event fan-out buffer.
    pub event_buffer: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_clock_secs: 300,
            tick_interval_ms: 1_000,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Attempts against the move oracle before giving up on a bot turn.
    pub retry_limit: u32,
    pub retry_delay_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            retry_delay_ms: 250,
        }
    }
}

/// Static token-to-user mapping consumed by the default auth provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, UserId>,
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path.
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables.
    pub fn load(&self) -> EngineResult<GambitConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            GambitConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<GambitConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ExternalServiceUnavailable(format!("failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            EngineError::ExternalServiceUnavailable(format!("failed to parse TOML: {}", e))
        })
    }

    fn apply_env_overrides(&self, config: &mut GambitConfig) -> EngineResult<()> {
        if let Ok(addr) = env::var("GAMBIT_LISTEN_ADDRESS") {
            config.server.listen_address = addr;
        }
        if let Ok(port) = env::var("GAMBIT_PORT") {
            config.server.port = port.parse().map_err(|_| {
                EngineError::ExternalServiceUnavailable(format!(
                    "invalid GAMBIT_PORT value: {}",
                    port
                ))
            })?;
        }
        if let Ok(secs) = env::var("GAMBIT_INITIAL_CLOCK_SECS") {
            config.game.initial_clock_secs = secs.parse().map_err(|_| {
                EngineError::ExternalServiceUnavailable(format!(
                    "invalid GAMBIT_INITIAL_CLOCK_SECS value: {}",
                    secs
                ))
            })?;
        }
        if let Ok(ms) = env::var("GAMBIT_TICK_INTERVAL_MS") {
            config.game.tick_interval_ms = ms.parse().map_err(|_| {
                EngineError::ExternalServiceUnavailable(format!(
                    "invalid GAMBIT_TICK_INTERVAL_MS value: {}",
                    ms
                ))
            })?;
        }
        if let Ok(limit) = env::var("GAMBIT_BOT_RETRY_LIMIT") {
            config.bot.retry_limit = limit.parse().map_err(|_| {
                EngineError::ExternalServiceUnavailable(format!(
                    "invalid GAMBIT_BOT_RETRY_LIMIT value: {}",
                    limit
                ))
            })?;
        }
        Ok(())
    }

    fn validate(&self, config: &GambitConfig) -> EngineResult<()> {
        if config.server.port == 0 {
            return Err(EngineError::ExternalServiceUnavailable(
                "server.port cannot be zero".to_string(),
            ));
        }
        if config.game.initial_clock_secs <= 0 {
            return Err(EngineError::ExternalServiceUnavailable(
                "game.initial_clock_secs must be positive".to_string(),
            ));
        }
        if config.game.tick_interval_ms < 100 {
            return Err(EngineError::ExternalServiceUnavailable(
                "game.tick_interval_ms must be at least 100".to_string(),
            ));
        }
        if config.game.event_buffer == 0 {
            return Err(EngineError::ExternalServiceUnavailable(
                "game.event_buffer cannot be zero".to_string(),
            ));
        }
        if config.bot.retry_limit == 0 {
            return Err(EngineError::ExternalServiceUnavailable(
                "bot.retry_limit cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &GambitConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| {
            EngineError::ExternalServiceUnavailable(format!("failed to serialize config: {}", e))
        })?;

        std::fs::write(path, toml_string).map_err(|e| {
            EngineError::ExternalServiceUnavailable(format!("failed to write {}: {}", path, e))
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GambitConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.game.initial_clock_secs, 300);
        assert_eq!(config.game.tick_interval_ms, 1_000);
        assert_eq!(config.bot.retry_limit, 3);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = GambitConfig::default();
        assert!(loader.validate(&config).is_ok());

        config.server.port = 0;
        assert!(loader.validate(&config).is_err());

        config.server.port = 8080;
        config.game.initial_clock_secs = 0;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() -> EngineResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = GambitConfig::default();
        original.game.initial_clock_secs = 600;
        original.auth.tokens.insert("alice-token".to_string(), 1);

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.game.initial_clock_secs, 600);
        assert_eq!(loaded.auth.tokens.get("alice-token"), Some(&1));
        assert_eq!(loaded.server.port, original.server.port);

        Ok(())
    }
}
