use anyhow::Result;
use engage_gate::BlockedRegion;
use engage_types::EngineParams;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub engine: EngineParams,
    /// Regions denied the task surface entirely.
    pub regions: Vec<BlockedRegion>,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
    pub data_dir: PathBuf,
    /// Origin the task surface is served from; drives the same-origin
    /// check that picks the signal acquisition strategy.
    pub host_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "engage-node".to_string(),
                data_dir: PathBuf::from("./data"),
                host_origin: "https://app.example.com".to_string(),
            },
            engine: EngineParams::default(),
            regions: vec![],
            api: ApiConfig {
                enabled: true,
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Environment variable overrides, applied by the binary after file
    /// and CLI precedence is settled.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = env::var("ENGAGE_DATA_DIR") {
            self.node.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(origin) = env::var("ENGAGE_HOST_ORIGIN") {
            self.node.host_origin = origin;
        }
        if let Ok(host) = env::var("ENGAGE_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = env::var("ENGAGE_API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
        if let Ok(quota) = env::var("ENGAGE_DAILY_QUOTA") {
            if let Ok(quota) = quota.parse() {
                self.engine.daily_quota = quota;
            }
        }
        if let Ok(days) = env::var("ENGAGE_TRIAL_WINDOW_DAYS") {
            if let Ok(days) = days.parse() {
                self.engine.trial_window_days = days;
            }
        }
        if let Ok(level) = env::var("ENGAGE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}
