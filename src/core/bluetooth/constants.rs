//! Constants used throughout the Bluetooth layer
//! UUIDs of the vendor GATT profile, retry counts and timeouts.

use uuid::Uuid;

/// The vendor service carrying the command characteristic
pub const UUID_WRITE_SERVICE: Uuid = Uuid::from_u128(0x00001000_0000_1000_8000_00805f9b34fb);

/// The characteristic command frames are written to
pub const UUID_WRITE_CHAR: Uuid = Uuid::from_u128(0x00001001_0000_1000_8000_00805f9b34fb);

/// Maximum number of connection attempts per discovered device
pub const MAX_CONNECT_RETRIES: u32 = 3;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Upper bound for a single frame write in milliseconds
pub const WRITE_TIMEOUT_MS: u64 = 10_000;

/// Delay before restarting a stopped advertisement watcher in milliseconds
pub const SCAN_RESTART_DELAY_MS: u64 = 1000;

/// Capacity of the discovery channel between scanner and connector
pub const DISCOVERY_CHANNEL_CAPACITY: usize = 8;
