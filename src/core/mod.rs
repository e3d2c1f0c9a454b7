//! Core functionality for the Galaku bridge
//! Device domain, Bluetooth link, command queue and the bridge on top of them.

pub mod bluetooth;
pub mod bridge;
pub mod device;
pub mod engine;
pub mod error;
pub mod queue;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use bridge::{DeviceBackend, GalakuBackend, GlobalKey, InputKey};
pub use engine::{DeviceAdded, DeviceEngine, ScanState};
pub use error::{FrameError, LinkError};
pub use queue::{ActionOptions, CommandQueue};
