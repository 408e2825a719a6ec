use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::listener::ListenerConfig;
use crate::blockchain::simulator::SimulatorConfig;
use crate::error::ConfigError;
use crate::models::Network;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listener: ListenerSettings,
    pub networks: Vec<NetworkConfig>,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

/// Engine settings shared by every network unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Blocks required on top of a transaction's block; 0 selects the engine default
    pub confirmation_depth: u64,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Capacity of each listener's event stream
    pub channel_capacity: usize,
}

/// One listened network and its overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub name: String,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub confirmation_depth: Option<u64>,
}

/// Watch store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind (memory, sqlite)
    pub backend: String,
    /// SQLite database file path
    pub path: String,
}

/// Simulated chain traffic driving the demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Interval between minted blocks in milliseconds
    pub block_interval_ms: u64,
    pub transfers_per_block: usize,
    /// Chance per block that the tip is replaced; off unless configured
    pub reorg_probability: f64,
    /// Addresses registered with every listener at startup
    pub watched_addresses: Vec<String>,
    pub seed: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listener: ListenerSettings::default(),
            networks: vec![
                NetworkConfig::new("ETH", 1000),
                NetworkConfig::new("BTC", 2000),
                NetworkConfig::new("TRX", 1000),
            ],
            storage: StorageConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            confirmation_depth: 0,
            poll_interval_ms: 1000,
            channel_capacity: 100,
        }
    }
}

impl NetworkConfig {
    pub fn new(name: &str, poll_interval_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            poll_interval_ms: Some(poll_interval_ms),
            confirmation_depth: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "./watch_store.db".to_string(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 1500,
            transfers_per_block: 4,
            reorg_probability: 0.0,
            watched_addresses: vec!["0xaddr".to_string()],
            seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], reading `path` instead of `CONFIG_FILE`.
    /// An explicit path must exist.
    pub fn load_with(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_from_file()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`, falling back to defaults
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Listener configuration
        if let Some(depth) = parse_env("CONFIRMATION_DEPTH")? {
            self.listener.confirmation_depth = depth;
        }
        if let Some(interval) = parse_env("POLL_INTERVAL_MS")? {
            self.listener.poll_interval_ms = interval;
        }
        if let Some(capacity) = parse_env("CHANNEL_CAPACITY")? {
            self.listener.channel_capacity = capacity;
        }

        // Storage configuration
        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(path) = env::var("STORAGE_PATH") {
            self.storage.path = path;
        }

        // Logging configuration
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A zero confirmation depth is left to the engine default
        if self.listener.poll_interval_ms == 0 {
            return Err(invalid("listener.poll_interval_ms", 0));
        }
        if self.listener.channel_capacity == 0 {
            return Err(invalid("listener.channel_capacity", 0));
        }

        let mut names = HashSet::new();
        for network in &self.networks {
            if network.name.trim().is_empty() {
                return Err(invalid("networks.name", &network.name));
            }
            if !names.insert(network.name.as_str()) {
                return Err(invalid("networks.name", format!("duplicate {}", network.name)));
            }
            if network.poll_interval_ms == Some(0) {
                return Err(invalid(&format!("networks.{}.poll_interval_ms", network.name), 0));
            }
        }

        match self.storage.backend.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.storage.path.trim().is_empty() {
                    return Err(invalid("storage.path", &self.storage.path));
                }
            }
            other => return Err(invalid("storage.backend", other)),
        }

        if self.simulation.block_interval_ms == 0 {
            return Err(invalid("simulation.block_interval_ms", 0));
        }
        if !(0.0..=1.0).contains(&self.simulation.reorg_probability) {
            return Err(invalid("simulation.reorg_probability", self.simulation.reorg_probability));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Configured networks, in file order
    pub fn network_keys(&self) -> Vec<Network> {
        self.networks.iter().map(|n| Network::new(n.name.clone())).collect()
    }

    /// Engine configuration for `network`, with its overrides applied
    pub fn listener_config_for(&self, network: &Network) -> ListenerConfig {
        let overrides = self.networks.iter().find(|n| n.name == network.as_str());

        let poll_interval_ms = overrides
            .and_then(|n| n.poll_interval_ms)
            .unwrap_or(self.listener.poll_interval_ms);
        let confirmation_depth = overrides
            .and_then(|n| n.confirmation_depth)
            .unwrap_or(self.listener.confirmation_depth);

        ListenerConfig::default()
            .with_confirmation_depth(confirmation_depth)
            .with_poll_interval(Duration::from_millis(poll_interval_ms))
            .with_channel_capacity(self.listener.channel_capacity)
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            block_interval: Duration::from_millis(self.simulation.block_interval_ms),
            transfers_per_block: self.simulation.transfers_per_block,
            reorg_probability: self.simulation.reorg_probability,
            addresses: self.simulation.watched_addresses.clone(),
            seed: self.simulation.seed,
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        let config = Self::default();
        toml::to_string_pretty(&config).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
