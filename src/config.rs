use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Application configuration, read from TOML with environment overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("reviews.db"),
        }
    }
}

impl AppConfig {
    /// Load from `$CONFIG_PATH` (or `config.toml`), then apply `PORT` and
    /// `DATABASE_PATH` from the environment. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("DATABASE_PATH").ok().as_deref(),
        )?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_overrides(&mut self, port: Option<&str>, database_path: Option<&str>) -> Result<()> {
        if let Some(port) = port.filter(|p| !p.is_empty()) {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT must be a port number, got {port:?}"))?;
        }
        if let Some(path) = database_path.filter(|p| !p.is_empty()) {
            self.storage.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
