//! Configuration: `guessing.toml`, then environment overrides, then validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::generator::{Bounds, DEFAULT_CEILING};

pub const DEFAULT_CONFIG_FILE: &str = "guessing.toml";
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub bounds: BoundsConfig,
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

/// Bounds supplied at build-step configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    /// Largest accepted `upper`.
    pub ceiling: i64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            lower: None,
            upper: None,
            ceiling: DEFAULT_CEILING,
        }
    }
}

impl BoundsConfig {
    /// Validated range, including the ceiling check.
    pub fn resolve(&self) -> Result<Bounds, ConfigError> {
        Bounds::new(self.lower, self.upper)?.within_ceiling(self.ceiling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Sqlite,
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                field: "store.backend".to_string(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis URL.
    pub url: String,
    /// SQLite file.
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: DEFAULT_STORE_URL.to_string(),
            path: "guesses.db".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "builds.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl GameConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: GameConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `guessing.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                let mut config = GameConfig::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = var("GUESSING_STORE_BACKEND") {
            self.store.backend = val.parse()?;
        }
        if let Some(val) = var("GUESSING_STORE_URL") {
            self.store.url = val;
        }
        if let Some(val) = var("GUESSING_STORE_TIMEOUT_MS") {
            self.store.timeout_ms = val.parse().map_err(|_| ConfigError::Invalid {
                field: "store.timeout_ms".to_string(),
                reason: format!("'{val}' is not a number"),
            })?;
        }
        if let Some(val) = var("GUESSING_LEDGER_PATH") {
            self.ledger.path = val;
        }
        if let Some(val) = var("GUESSING_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "store.timeout_ms".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.bounds.lower.is_some() && self.bounds.upper.is_some() {
            self.bounds.resolve()?;
        }
        Ok(())
    }
}
