//! Galaku bridge library
//! Exposes a single Galaku BLE haptic device to control-protocol clients.

pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
