//! Notification handling for the bound device
//! Subscribes to every notify characteristic and feeds decoded status frames
//! back into the device state.

use std::sync::Arc;

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::manager::BluetoothManager;
use crate::core::device::codec::{self, FRAME_LEN};
use crate::core::device::telemetry;

/// Notification handler for status frames
#[derive(Clone)]
pub struct NotificationHandler {
    manager: Arc<BluetoothManager>,
}

impl NotificationHandler {
    pub fn new(manager: Arc<BluetoothManager>) -> Self {
        Self { manager }
    }

    /// Spawns one listener per characteristic, all stopped by `cancel_token`.
    pub fn setup_notifications(&self, characteristics: Vec<Characteristic>, cancel_token: CancellationToken) {
        info!("Subscribing to {} notify characteristics...", characteristics.len());
        for characteristic in characteristics {
            let handler = self.clone();
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = handler.process_notifications(&characteristic) => {}
                    _ = cancel_token.cancelled() => {
                        debug!("Notification listener for {} cancelled", characteristic.uuid());
                    }
                }
            });
        }
    }

    async fn process_notifications(&self, characteristic: &Characteristic) {
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to subscribe to {}: {}", characteristic.uuid(), e);
                return;
            }
        };

        while let Some(result) = notification_stream.next().await {
            match result {
                Ok(value) => self.handle_data(&value).await,
                Err(e) => {
                    error!("Error in notification stream: {}", e);
                    break;
                }
            }
        }

        info!("Notification stream for {} ended", characteristic.uuid());
    }

    /// Decrypts and applies one inbound notification.
    pub async fn handle_data(&self, value: &[u8]) {
        if value.len() < FRAME_LEN {
            debug!("Ignoring short notification: {:?}", value);
            return;
        }
        match codec::decrypt_notification(value) {
            Ok(plain) => {
                debug!("Received status frame: {:02X?}", plain);
                self.manager.apply_status(telemetry::decode_status(&plain)).await;
            }
            Err(e) => debug!("Undecodable notification: {}", e),
        }
    }
}
