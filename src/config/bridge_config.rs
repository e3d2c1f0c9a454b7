use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::{SCAN_RESTART_DELAY_MS, WRITE_TIMEOUT_MS};
use crate::core::device::motion::STEP_INTERVAL_MS;
use crate::utils::ensure_directory_exists;

const CONFIG_DIR_NAME: &str = "galaku-bridge";
const CONFIG_FILE_NAME: &str = "bridge_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Device catalog file (`{"items": [...]}`).
    pub catalog_path: PathBuf,

    /// Last-known-device snapshot, answered while no device is bound.
    pub cache_path: PathBuf,

    /// Cadence between motion samples in linear mode.
    pub step_interval_ms: u32,

    /// Delay before a stopped advertisement watcher is restarted.
    pub scan_restart_delay_ms: u64,

    /// How often the presence probe looks for a device to announce.
    pub presence_probe_interval_ms: u64,

    /// Upper bound for a single frame write before the link counts as lost.
    pub write_timeout_ms: u64,

    /// log crate level filter name
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            catalog_path: PathBuf::from("device_items.json"),
            cache_path: PathBuf::from("DeviceRecordNextTime.json"),
            step_interval_ms: STEP_INTERVAL_MS,
            scan_restart_delay_ms: SCAN_RESTART_DELAY_MS,
            presence_probe_interval_ms: 1000,
            write_timeout_ms: WRITE_TIMEOUT_MS,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/galaku-bridge/bridge_config.json`, or the working directory
    /// when the platform has no config dir.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .unwrap_or_default()
            .join(CONFIG_FILE_NAME)
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Loads the config, writing the defaults out first when the file does not exist yet.
    pub async fn load_or_create(file_path: &Path) -> Result<Self> {
        if file_path.exists() {
            return Self::load_config(file_path).await;
        }

        let config = Self::default();
        if let Err(e) = config.save_config(file_path).await {
            warn!("Failed to write default config to {:?}: {}", file_path, e);
        }
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(parent).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize bridge config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Bridge config saved to {:?}.", file_path);
        Ok(())
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            log::LevelFilter::Info
        })
    }
}
