//! Device domain: catalog entries, live state and the Galaku wire format.

pub mod codec;
pub mod descriptor;
pub mod encoder;
pub mod motion;
pub mod telemetry;
pub mod types;

pub use codec::Frame;
pub use descriptor::DeviceInfo;
pub use telemetry::StatusReport;
pub use types::{CatalogEntry, DeviceModel, DeviceState, DeviceType};
