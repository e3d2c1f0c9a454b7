//! Bluetooth functionality for the Galaku bridge
//! This module handles all bluetooth operations including scanning,
//! connecting, writing command frames and receiving status notifications.

mod commands;
mod connection;
mod constants;
mod manager;
mod notification;
mod recording;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use commands::{CommandExecutor, DeviceLink};
pub use connection::{BluestLink, ConnectionManager};
pub use constants::*;
pub use manager::{BluetoothManager, DeviceSlot};
pub use notification::NotificationHandler;
pub use recording::{RecordingLink, ScanScript, ScriptedTransport, simulated_advertisement};
pub use scanner::BluetoothScanner;
pub use transport::{Advertisement, BleTransport, BluestTransport, Connection};
pub use types::{BluetoothDevice, ConnectedDeviceState, ConnectionState, Discovered, extract_mac_address};
