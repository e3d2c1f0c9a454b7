//! Application state management
//! `AppState` is the explicit session object: it owns the Bluetooth manager,
//! the command queue worker, the Galaku backend and the device engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use bluest::Adapter;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{BridgeConfig, DeviceCache, DeviceCatalog};
use crate::core::bluetooth::{BluestTransport, BluetoothManager, ConnectionState};
use crate::core::bridge::{DeviceBackend, GalakuBackend};
use crate::core::engine::{DeviceAdded, DeviceEngine};
use crate::core::queue::{CommandQueue, spawn_worker};

pub struct AppState {
    pub config: BridgeConfig,
    /// The Bluetooth manager instance
    pub bluetooth_manager: Arc<BluetoothManager>,
    pub backend: Arc<GalakuBackend>,
    pub engine: Arc<DeviceEngine>,
    tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Builds the session and starts the queue worker. Bluetooth is started separately.
    pub fn new(config: BridgeConfig) -> (Self, mpsc::UnboundedReceiver<DeviceAdded>) {
        let queue = Arc::new(CommandQueue::new());
        let bluetooth_manager = Arc::new(BluetoothManager::new(queue.clone()));
        let backend = Arc::new(GalakuBackend::new(
            bluetooth_manager.clone(),
            Duration::from_millis(u64::from(config.step_interval_ms)),
        ));
        let (engine, announcements) = DeviceEngine::new(
            vec![backend.clone() as Arc<dyn DeviceBackend>],
            DeviceCache::new(config.cache_path.clone()),
            Duration::from_millis(config.presence_probe_interval_ms),
        );

        let worker = spawn_worker(queue, bluetooth_manager.clone());
        let greeter = Self::spawn_greeter(&bluetooth_manager, backend.clone());

        let state = Self {
            config,
            bluetooth_manager,
            backend,
            engine: Arc::new(engine),
            tasks: vec![worker, greeter],
        };
        (state, announcements)
    }

    /// Greets every freshly bound device.
    fn spawn_greeter(manager: &BluetoothManager, backend: Arc<GalakuBackend>) -> JoinHandle<()> {
        let mut state_rx = manager.subscribe();
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                if state == ConnectionState::Connected {
                    backend.on_connected().await;
                }
            }
        })
    }

    /// Waits for the default adapter and starts discovery against `catalog`.
    pub async fn start_bluetooth(&mut self, catalog: Arc<DeviceCatalog>) -> Result<()> {
        info!("Initializing Bluetooth adapter...");
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let transport = Arc::new(BluestTransport::new(
            adapter,
            Duration::from_millis(self.config.write_timeout_ms),
        ));
        let discovery = self.bluetooth_manager.start(transport, catalog, &self.config);
        self.tasks.push(discovery);
        Ok(())
    }

    pub fn start_presence_probe(&mut self) {
        let probe = self.engine.spawn_presence_probe();
        self.tasks.push(probe);
    }

    /// Halts the device, then stops every background task and drops the link.
    pub async fn shutdown(self) {
        self.engine.stop_device().await;
        // Give the worker one step to flush the halt frame.
        tokio::time::sleep(Duration::from_millis(u64::from(self.config.step_interval_ms))).await;
        for task in &self.tasks {
            task.abort();
        }
        self.bluetooth_manager.disconnect().await;
        info!("Session closed");
    }
}
