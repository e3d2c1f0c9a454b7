//! Advertisement watcher
//! Matches advertised local names against the device catalog and hands matches to
//! the connector. A watcher that stops is restarted after a fixed delay, forever.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::catalog::DeviceCatalog;
use crate::core::bluetooth::transport::{Advertisement, BleTransport};
use crate::core::bluetooth::types::{BluetoothDevice, Discovered};

pub struct BluetoothScanner<T: BleTransport> {
    transport: Arc<T>,
    catalog: Arc<DeviceCatalog>,
    restart_delay: Duration,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl<T: BleTransport> BluetoothScanner<T> {
    pub fn new(transport: Arc<T>, catalog: Arc<DeviceCatalog>, restart_delay: Duration) -> Self {
        Self {
            transport,
            catalog,
            restart_delay,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts the watcher task, replacing any previous one.
    pub async fn start_scan(&mut self, discovered_tx: mpsc::Sender<Discovered<T::Device>>) {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await;
        }

        self.cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::watch_loop(
            self.transport.clone(),
            self.catalog.clone(),
            self.restart_delay,
            discovered_tx,
            self.cancel_token.clone(),
        ));
        self.scan_task_handle = Some(handle);
        info!("Advertisement watcher task started.");
    }

    pub async fn stop_scan(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(()) => info!("Scan task finished after cancellation."),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        }
    }

    async fn watch_loop(
        transport: Arc<T>,
        catalog: Arc<DeviceCatalog>,
        restart_delay: Duration,
        discovered_tx: mpsc::Sender<Discovered<T::Device>>,
        cancel_token: CancellationToken,
    ) {
        loop {
            match transport.scan().await {
                Ok(mut scan_stream) => {
                    info!("Bluetooth scan started");
                    loop {
                        tokio::select! {
                            next = scan_stream.next() => match next {
                                Some(advertisement) => {
                                    if !Self::offer(&catalog, &discovered_tx, advertisement) {
                                        return;
                                    }
                                }
                                None => break,
                            },
                            _ = cancel_token.cancelled() => return,
                        }
                    }
                    warn!("Bluetooth scan stream has ended, restarting in {:?}", restart_delay);
                }
                Err(e) => warn!("Failed to start Bluetooth scan: {}, retrying in {:?}", e, restart_delay),
            }

            tokio::select! {
                _ = tokio::time::sleep(restart_delay) => {}
                _ = cancel_token.cancelled() => return,
            }
        }
    }

    /// Forwards a matching advertisement. Returns false once the connector is gone.
    fn offer(
        catalog: &DeviceCatalog,
        discovered_tx: &mpsc::Sender<Discovered<T::Device>>,
        advertisement: Advertisement<T::Device>,
    ) -> bool {
        let Some(local_name) = advertisement.local_name.as_deref() else {
            return true;
        };
        let Some(entry) = catalog.match_advertisement(local_name) else {
            return true;
        };

        let info = BluetoothDevice::new(advertisement.id.clone(), local_name.to_string(), advertisement.rssi);
        debug!(
            "Matched advertisement {} ({}), RSSI: {:?}",
            info.name, info.address, info.rssi
        );

        let discovered = Discovered {
            device: advertisement.device,
            info,
            entry: entry.clone(),
        };
        match discovered_tx.try_send(discovered) {
            Ok(()) => true,
            // Connector is busy; the device keeps advertising.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
