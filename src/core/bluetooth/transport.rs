//! Radio seam for discovery and connection
//! The scanner and the connect loop only see [`BleTransport`]; `BluestTransport`
//! is the real adapter, `ScriptedTransport` drives them in tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::core::bluetooth::commands::DeviceLink;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::constants::{CONNECT_RETRY_DELAY_MS, MAX_CONNECT_RETRIES};
use crate::core::error::LinkError;

/// One advertisement as seen by the watcher
#[derive(Debug, Clone)]
pub struct Advertisement<D> {
    pub device: D,
    /// Platform device id
    pub id: String,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
}

/// A connected device ready to be bound
pub struct Connection {
    pub link: Arc<dyn DeviceLink>,
    pub notify_characteristics: Vec<Characteristic>,
}

#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    type Device: Send + Sync + 'static;

    /// Starts one advertisement scan. The stream ending means the watcher stopped.
    async fn scan(&self) -> Result<BoxStream<'_, Advertisement<Self::Device>>, LinkError>;

    /// Connects to `device` and resolves the vendor profile.
    async fn connect(&self, device: &Self::Device) -> Result<Connection>;
}

/// The platform adapter through bluest
pub struct BluestTransport {
    adapter: Adapter,
    connector: ConnectionManager,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, write_timeout: Duration) -> Self {
        let connector = ConnectionManager::new(
            adapter.clone(),
            MAX_CONNECT_RETRIES,
            CONNECT_RETRY_DELAY_MS,
            write_timeout,
        );
        Self { adapter, connector }
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    type Device = Device;

    async fn scan(&self) -> Result<BoxStream<'_, Advertisement<Device>>, LinkError> {
        let stream = self.adapter.scan(&[]).await?;
        Ok(stream
            .map(|advertising| Advertisement {
                id: advertising.device.id().to_string(),
                local_name: advertising.adv_data.local_name,
                rssi: advertising.rssi,
                device: advertising.device,
            })
            .boxed())
    }

    async fn connect(&self, device: &Device) -> Result<Connection> {
        let connected = self.connector.connect_with_retry(device).await?;
        let link: Arc<dyn DeviceLink> = Arc::new(self.connector.link(&connected));
        Ok(Connection {
            link,
            notify_characteristics: connected.notify_characteristics,
        })
    }
}
