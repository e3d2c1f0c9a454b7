pub mod bridge_config;
pub mod catalog;
pub mod device_cache;

pub use bridge_config::BridgeConfig;
pub use catalog::DeviceCatalog;
pub use device_cache::DeviceCache;
