//! Link abstraction and the frame-level commands sent over it

use async_trait::async_trait;
use log::debug;

use crate::core::device::encoder;
use crate::core::device::{DeviceState, DeviceType, Frame};
use crate::core::error::LinkError;

/// A writable connection to the bound device
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Whether the transport still reports the device as connected
    async fn is_connected(&self) -> bool;

    /// Writes one encrypted frame to the command characteristic
    async fn write_frame(&self, frame: &Frame) -> Result<(), LinkError>;

    /// Releases the transport handles
    async fn close(&self) {}
}

/// Command executor for the bound device
pub struct CommandExecutor<'a> {
    link: &'a dyn DeviceLink,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(link: &'a dyn DeviceLink) -> Self {
        Self { link }
    }

    /// Flushes the current setpoints as an intensity frame.
    ///
    /// Returns `Ok(true)` when a frame went out. Clean states send nothing. Only
    /// the ShakeTwo family is actuated; other families just drop the dirty flag.
    pub async fn send_control(&self, state: &mut DeviceState) -> Result<bool, LinkError> {
        if !state.is_dirty() {
            return Ok(false);
        }
        if state.entry().device_type != DeviceType::ShakeTwo {
            state.clear_dirty();
            return Ok(false);
        }

        let frame = encoder::intensity_frame(state);
        debug!("Sending intensity frame: {:02X?}", frame);
        self.link.write_frame(&frame).await?;
        state.clear_dirty();
        Ok(true)
    }

    /// Sends a heat command for `level`.
    pub async fn send_hot_level(&self, level: u8) -> Result<(), LinkError> {
        let frame = encoder::heat_frame(level);
        debug!("Sending heat frame (level {}): {:02X?}", level, frame);
        self.link.write_frame(&frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::RecordingLink;
    use crate::core::device::CatalogEntry;

    fn state(device_type: DeviceType) -> DeviceState {
        CatalogEntry {
            local_name: "G149".into(),
            display_name: "Cup".into(),
            device_type,
            is_ble_device: true,
            ..CatalogEntry::default()
        }
        .resolved()
        .instantiate()
    }

    #[tokio::test]
    async fn one_frame_per_dirty_transition() {
        let link = RecordingLink::new();
        let executor = CommandExecutor::new(link.as_ref());
        let mut state = state(DeviceType::ShakeTwo);

        assert!(!executor.send_control(&mut state).await.unwrap());
        state.set_value_a(50);
        assert!(executor.send_control(&mut state).await.unwrap());
        assert!(!state.is_dirty());
        assert!(!executor.send_control(&mut state).await.unwrap());

        let frames = link.decrypted_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][1..11], &[0x5A, 0, 0, 1, 0x40, 3, 65, 22, 0, 0]);
    }

    #[tokio::test]
    async fn other_families_are_not_actuated() {
        let link = RecordingLink::new();
        let executor = CommandExecutor::new(link.as_ref());
        let mut state = state(DeviceType::ShakeOne);

        state.set_value_a(80);
        assert!(!executor.send_control(&mut state).await.unwrap());
        assert!(!state.is_dirty());
        assert!(link.frames().is_empty());
    }

    #[tokio::test]
    async fn failed_write_keeps_state_dirty() {
        let link = RecordingLink::new();
        link.set_fail_writes(true);
        let executor = CommandExecutor::new(link.as_ref());
        let mut state = state(DeviceType::ShakeTwo);

        state.set_value_a(10);
        assert!(executor.send_control(&mut state).await.is_err());
        assert!(state.is_dirty());
    }

    #[tokio::test]
    async fn heat_frame_carries_level() {
        let link = RecordingLink::new();
        CommandExecutor::new(link.as_ref())
            .send_hot_level(1)
            .await
            .unwrap();
        let frames = link.decrypted_frames();
        assert_eq!(&frames[0][1..7], &[0x5A, 0, 0, 1, 0x80, 1]);
    }
}
