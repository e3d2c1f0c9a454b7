//! Defines shared data structures for the Bluetooth module.

use std::sync::OnceLock;

use bluest::{Characteristic, Device};
use regex::Regex;

use crate::core::device::CatalogEntry;

/// Lifecycle of the single device slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    /// The bound device was torn down; scanning resumes automatically
    Disconnected,
}

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, serde::Serialize)]
pub struct BluetoothDevice {
    /// The advertised local name
    pub name: String,
    /// The address of the device (MAC address on most platforms, may be N/A on macOS)
    pub address: String,
    /// Platform-specific unique identifier for the device
    pub id: String,
    /// The signal strength (RSSI) of the advertisement
    pub rssi: Option<i16>,
}

impl BluetoothDevice {
    pub fn new(id: String, name: String, rssi: Option<i16>) -> Self {
        let address = extract_mac_address(&id).unwrap_or_else(|| "N/A".to_string());
        Self {
            name,
            address,
            id,
            rssi,
        }
    }
}

/// Pulls the last MAC-looking token out of a platform device id.
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    static MAC: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MAC
        .get_or_init(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok())
        .as_ref()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

/// An advertisement that matched a BLE catalog entry
pub struct Discovered<D> {
    pub device: D,
    pub info: BluetoothDevice,
    pub entry: CatalogEntry,
}

/// Represents the state of a successfully connected device.
/// This struct holds the active handles needed for interaction.
#[derive(Clone)]
pub struct ConnectedDeviceState {
    /// The device handle, used for checking connection status or disconnecting.
    pub device: Device,
    /// The characteristic handle for writing command frames.
    pub write_characteristic: Characteristic,
    /// Every other notify-capable characteristic the device exposes.
    pub notify_characteristics: Vec<Characteristic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_is_extracted_from_platform_ids() {
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLEe0:d4:64:aa:bb:cc-c0:11:22:33:44:55"),
            Some("C0:11:22:33:44:55".to_string())
        );
        assert_eq!(extract_mac_address("4F2C1A9E-0000-4000-8000-1234"), None);
    }

    #[test]
    fn unknown_address_is_reported_as_na() {
        let device = BluetoothDevice::new("opaque".into(), "G149".into(), Some(-60));
        assert_eq!(device.address, "N/A");
    }
}
