//! Error types shared by the codec and the Bluetooth link.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised at the frame codec boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A command body must carry at least one byte
    #[error("command body is empty")]
    EmptyBody,

    /// A command body does not fit between the sentinel and the checksum
    #[error("command body too long: {0} bytes (max 10)")]
    BodyTooLong(usize),

    /// Inbound data shorter than one cipher block
    #[error("frame too short: {0} bytes (need 12)")]
    TooShort(usize),
}

/// Errors from the physical link to the device
#[derive(Error, Debug)]
pub enum LinkError {
    /// The device reports it is no longer connected
    #[error("device is not connected")]
    NotConnected,

    /// The write did not complete within the transport timeout
    #[error("write timed out after {0} ms")]
    WriteTimeout(u64),

    /// The write was rejected by the Bluetooth stack
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The vendor GATT service was not found during discovery
    #[error("service not found: {0}")]
    ServiceNotFound(Uuid),

    /// The vendor write characteristic was not found during discovery
    #[error("write characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    /// The advertisement scan could not be started
    #[error("scan failed: {0}")]
    ScanFailed(String),

    /// Any other error surfaced by the Bluetooth adapter
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),
}
