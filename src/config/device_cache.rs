//! Last-known-device cache
//! Best effort: I/O and parse failures are logged and otherwise ignored.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs;

use crate::core::device::DeviceInfo;

pub struct DeviceCache {
    path: PathBuf,
}

impl DeviceCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an already serialized snapshot. Returns whether it landed on disk.
    pub async fn save(&self, serialized: &str) -> bool {
        match fs::write(&self.path, serialized).await {
            Ok(()) => {
                debug!("Cached device snapshot to {:?}", self.path);
                true
            }
            Err(e) => {
                warn!("Failed to cache device snapshot at {:?}: {}", self.path, e);
                false
            }
        }
    }

    /// Reads the cached snapshot together with its raw JSON.
    pub async fn load_fallback(&self) -> Option<(DeviceInfo, String)> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) => {
                debug!("No cached device snapshot at {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(info) => Some((info, json)),
            Err(e) => {
                warn!("Ignoring corrupt device cache {:?}: {}", self.path, e);
                None
            }
        }
    }
}
