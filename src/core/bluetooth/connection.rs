//! Bluetooth connection handling for Galaku devices
//! This module connects to a discovered device, resolves the vendor GATT profile
//! and wraps the write characteristic as a [`DeviceLink`].

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use log::{debug, info, warn};

use crate::core::bluetooth::commands::DeviceLink;
use crate::core::bluetooth::constants::{UUID_WRITE_CHAR, UUID_WRITE_SERVICE};
use crate::core::bluetooth::types::ConnectedDeviceState;
use crate::core::device::Frame;
use crate::core::error::LinkError;

/// Connection manager for the device
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    max_retries: u32,
    retry_delay: u64,
    write_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, max_retries: u32, retry_delay: u64, write_timeout: Duration) -> Self {
        Self {
            adapter,
            max_retries,
            retry_delay,
            write_timeout,
        }
    }

    /// Connect to the device with retry mechanism
    pub async fn connect_with_retry(&self, device: &Device) -> Result<ConnectedDeviceState> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match self.try_connect(device).await {
                Ok(state) => {
                    info!("Successfully connected to device");
                    return Ok(state);
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);

                    if attempt + 1 < self.max_retries {
                        info!("Retrying connection in {} ms...", self.retry_delay);
                        tokio::time::sleep(Duration::from_millis(self.retry_delay)).await;
                    }
                }
            }
        }

        Err(last_error
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow!("Failed to connect after {} attempts", self.max_retries)))
    }

    /// Try to connect once and resolve the vendor characteristics
    async fn try_connect(&self, device: &Device) -> Result<ConnectedDeviceState, LinkError> {
        let id = device.id().to_string();

        if !device.is_connected().await {
            info!("Initiating connection to {}...", id);
            self.adapter.connect_device(device).await?;
        }

        info!("Connection successful, discovering services...");
        let services = device.services().await?;
        if !services.iter().any(|s| s.uuid() == UUID_WRITE_SERVICE) {
            for service in &services {
                info!("Available service: {}", service.uuid());
            }
            return Err(LinkError::ServiceNotFound(UUID_WRITE_SERVICE));
        }

        let mut write_char: Option<Characteristic> = None;
        let mut notify_chars = Vec::new();

        for service in &services {
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid();
                if write_char.is_none() && service.uuid() == UUID_WRITE_SERVICE && uuid == UUID_WRITE_CHAR {
                    info!("Found write characteristic: {}", uuid);
                    write_char = Some(characteristic);
                    continue;
                }
                match characteristic.properties().await {
                    Ok(props) if props.notify => {
                        debug!("Found notify characteristic: {}", uuid);
                        notify_chars.push(characteristic);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Skipping characteristic {}: {}", uuid, e),
                }
            }
        }

        let write_characteristic = write_char.ok_or(LinkError::CharacteristicNotFound(UUID_WRITE_CHAR))?;

        info!(
            "GATT profile resolved: 1 write characteristic, {} notify characteristics",
            notify_chars.len()
        );
        Ok(ConnectedDeviceState {
            device: device.clone(),
            write_characteristic,
            notify_characteristics: notify_chars,
        })
    }

    /// Wraps a connected device as a link with this manager's write timeout.
    pub fn link(&self, state: &ConnectedDeviceState) -> BluestLink {
        BluestLink {
            adapter: self.adapter.clone(),
            device: state.device.clone(),
            write_char: state.write_characteristic.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

async fn disconnect_device(adapter: &Adapter, device: &Device) -> Result<(), LinkError> {
    if device.is_connected().await {
        info!("Disconnecting from device {}", device.id());
        adapter.disconnect_device(device).await?;
        info!("Successfully disconnected");
    } else {
        info!("Device {} not connected", device.id());
    }
    Ok(())
}

/// A [`DeviceLink`] backed by a bluest write characteristic
#[derive(Clone)]
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    write_char: Characteristic,
    write_timeout: Duration,
}

#[async_trait]
impl DeviceLink for BluestLink {
    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), LinkError> {
        match tokio::time::timeout(self.write_timeout, self.write_char.write(frame)).await {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => Err(LinkError::WriteTimeout(self.write_timeout.as_millis() as u64)),
        }
    }

    async fn close(&self) {
        if let Err(e) = disconnect_device(&self.adapter, &self.device).await {
            warn!("Failed to disconnect {}: {}", self.device.id(), e);
        }
    }
}
