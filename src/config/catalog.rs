//! Device catalog loader
//! Reads `{"items": [...]}` and keys every entry by its advertised local name.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

use crate::core::device::CatalogEntry;

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<Value>,
}

/// Supported devices keyed by local name
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl DeviceCatalog {
    /// Loads the catalog file. Missing or corrupt files give an empty catalog.
    pub async fn load(path: &Path) -> Self {
        match fs::read_to_string(path).await {
            Ok(json) => {
                let catalog = Self::from_json_str(&json);
                info!("Loaded {} catalog entries from {:?}", catalog.len(), path);
                catalog
            }
            Err(e) => {
                warn!("Device catalog unavailable at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Parses catalog JSON, skipping items that are malformed or lack a local name.
    pub fn from_json_str(json: &str) -> Self {
        let file: CatalogFile = match serde_json::from_str(json) {
            Ok(file) => file,
            Err(e) => {
                warn!("Corrupt device catalog: {}", e);
                return Self::default();
            }
        };

        let mut entries = HashMap::new();
        for item in file.items {
            match serde_json::from_value::<CatalogEntry>(item) {
                Ok(entry) if !entry.local_name.is_empty() => {
                    let entry = entry.resolved();
                    entries.insert(entry.local_name.clone(), entry);
                }
                Ok(_) => warn!("Skipping catalog item without localName"),
                Err(e) => warn!("Skipping malformed catalog item: {}", e),
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, local_name: &str) -> Option<&CatalogEntry> {
        self.entries.get(local_name)
    }

    /// Entry for an advertised name, only when the device is driven over BLE.
    pub fn match_advertisement(&self, local_name: &str) -> Option<&CatalogEntry> {
        self.lookup(local_name).filter(|entry| entry.is_ble_device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
