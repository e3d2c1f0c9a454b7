//! Bluetooth manager for the Galaku bridge
//! Owns the single device slot: which device is bound, through which link, and
//! the connection state machine around it. The slot lock is the one mutual
//! exclusion domain shared by commands, the queue worker and teardown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::bridge_config::BridgeConfig;
use crate::config::catalog::DeviceCatalog;
use crate::core::bluetooth::commands::{CommandExecutor, DeviceLink};
use crate::core::bluetooth::constants::DISCOVERY_CHANNEL_CAPACITY;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::ConnectionState;
use crate::core::device::{CatalogEntry, DeviceState, StatusReport};
use crate::core::error::LinkError;
use crate::core::queue::{ActionContext, ActionExecutor, ActionOptions, CommandQueue, QueuedAction};

struct BoundDevice {
    state: DeviceState,
    link: Arc<dyn DeviceLink>,
    notifications: Option<CancellationToken>,
}

/// The device slot guarded by the manager's lock
#[derive(Default)]
pub struct DeviceSlot {
    connection: ConnectionState,
    bound: Option<BoundDevice>,
}

impl DeviceSlot {
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn device(&self) -> Option<&DeviceState> {
        self.bound.as_ref().map(|b| &b.state)
    }

    pub fn device_mut(&mut self) -> Option<&mut DeviceState> {
        self.bound.as_mut().map(|b| &mut b.state)
    }
}

/// Manages the Bluetooth link to the one active device
pub struct BluetoothManager {
    slot: Mutex<DeviceSlot>,
    queue: Arc<CommandQueue>,
    state_tx: watch::Sender<ConnectionState>,
}

impl BluetoothManager {
    pub fn new(queue: Arc<CommandQueue>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            slot: Mutex::new(DeviceSlot::default()),
            queue,
            state_tx,
        }
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// Subscribes to connection state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Acquires the device slot lock.
    pub async fn lock(&self) -> MutexGuard<'_, DeviceSlot> {
        self.slot.lock().await
    }

    fn set_state(&self, slot: &mut DeviceSlot, state: ConnectionState) {
        slot.connection = state;
        self.state_tx.send_replace(state);
    }

    async fn mark_scanning(&self) {
        let mut slot = self.lock().await;
        if !slot.is_bound() && slot.connection != ConnectionState::Connecting {
            self.set_state(&mut slot, ConnectionState::Scanning);
        }
    }

    /// Claims the slot for a connection attempt. False while bound or connecting.
    pub async fn try_begin_connect(&self) -> bool {
        let mut slot = self.lock().await;
        if slot.is_bound() || slot.connection == ConnectionState::Connecting {
            return false;
        }
        self.set_state(&mut slot, ConnectionState::Connecting);
        true
    }

    /// Releases a claim taken by [`Self::try_begin_connect`] after a failed attempt.
    pub async fn abort_connect(&self) {
        let mut slot = self.lock().await;
        if slot.connection == ConnectionState::Connecting {
            self.set_state(&mut slot, ConnectionState::Scanning);
        }
    }

    /// Binds a live copy of `entry` to `link`.
    ///
    /// Fails when a device is already bound. Binding does not check health; callers
    /// run [`Self::check_connection`] before touching the link.
    pub async fn bind(
        &self,
        entry: &CatalogEntry,
        link: Arc<dyn DeviceLink>,
        notifications: Option<CancellationToken>,
    ) -> bool {
        let mut slot = self.lock().await;
        if slot.is_bound() {
            warn!("Refusing to bind {}: a device is already bound", entry.display_name);
            return false;
        }
        slot.bound = Some(BoundDevice {
            state: entry.instantiate(),
            link,
            notifications,
        });
        info!("Connected to Bluetooth device: {}", entry.display_name);
        self.set_state(&mut slot, ConnectionState::Connected);
        true
    }

    /// Health check on a held slot. Tears the device down when the link is gone.
    pub async fn check_connection(&self, slot: &mut DeviceSlot) -> bool {
        let Some(bound) = slot.bound.as_ref() else {
            return false;
        };
        if bound.link.is_connected().await {
            return true;
        }
        let reason = format!("Bluetooth device disconnected: {}", bound.state.entry().display_name);
        self.teardown(slot, &reason).await;
        false
    }

    async fn teardown(&self, slot: &mut DeviceSlot, reason: &str) {
        let Some(bound) = slot.bound.take() else {
            return;
        };
        info!("{}", reason);
        if let Some(token) = bound.notifications {
            token.cancel();
        }
        bound.link.close().await;
        let dropped = self.queue.clear();
        if dropped > 0 {
            info!("Discarded {} pending actions", dropped);
        }
        self.set_state(slot, ConnectionState::Disconnected);
    }

    /// Single place where link faults are interpreted: the device is torn down.
    pub async fn report_link_fault(&self, error: &LinkError) {
        let mut slot = self.lock().await;
        self.teardown(&mut slot, &format!("Link fault, tearing down: {}", error))
            .await;
    }

    /// Explicitly unbinds the current device.
    pub async fn disconnect(&self) {
        let mut slot = self.lock().await;
        self.teardown(&mut slot, "Disconnecting from Bluetooth device").await;
    }

    /// Applies inbound telemetry. A heat echo queues the heat command again.
    pub async fn apply_status(&self, report: StatusReport) {
        let mut slot = self.lock().await;
        let Some(state) = slot.device_mut() else {
            return;
        };
        if state.apply_status(report) {
            let level = state.hot_level();
            self.queue
                .enqueue(ActionOptions::default().skip_flush(), move |ctx| ctx.request_heat(level));
        }
    }

    /// Runs discovery and connection until the returned task is aborted.
    pub fn start<T: BleTransport>(
        self: &Arc<Self>,
        transport: Arc<T>,
        catalog: Arc<DeviceCatalog>,
        config: &BridgeConfig,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        let restart_delay = Duration::from_millis(config.scan_restart_delay_ms);

        tokio::spawn(async move {
            let (discovered_tx, mut discovered_rx) = mpsc::channel(DISCOVERY_CHANNEL_CAPACITY);
            let mut scanner = BluetoothScanner::new(transport.clone(), catalog, restart_delay);
            scanner.start_scan(discovered_tx).await;
            manager.mark_scanning().await;

            let notifications = NotificationHandler::new(manager.clone());

            while let Some(discovered) = discovered_rx.recv().await {
                if !manager.try_begin_connect().await {
                    debug!("Ignoring advertisement from {}: slot is busy", discovered.info.name);
                    continue;
                }
                info!(
                    "Connecting to {} (address: {}, RSSI: {:?})",
                    discovered.entry.display_name, discovered.info.address, discovered.info.rssi
                );
                match transport.connect(&discovered.device).await {
                    Ok(connection) => {
                        let token = CancellationToken::new();
                        if manager
                            .bind(&discovered.entry, connection.link.clone(), Some(token.clone()))
                            .await
                        {
                            notifications.setup_notifications(connection.notify_characteristics, token);
                        } else {
                            connection.link.close().await;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to connect to {}: {}", discovered.entry.display_name, e);
                        manager.abort_connect().await;
                    }
                }
            }

            scanner.stop_scan().await;
        })
    }
}

#[async_trait]
impl ActionExecutor for BluetoothManager {
    async fn execute(&self, action: QueuedAction) {
        let options = action.options();
        let mut slot = self.lock().await;
        if !self.check_connection(&mut slot).await {
            return;
        }
        let Some(bound) = slot.bound.as_mut() else {
            return;
        };

        let heat_request = {
            let mut ctx = ActionContext::new(&mut bound.state, &self.queue);
            action.run(&mut ctx);
            ctx.heat_request()
        };

        let link = bound.link.clone();
        let executor = CommandExecutor::new(link.as_ref());
        let mut result = Ok(());
        if let Some(level) = heat_request {
            result = executor.send_hot_level(level).await;
        }
        if result.is_ok() && !options.skip_flush {
            result = executor.send_control(&mut bound.state).await.map(|_| ());
        }

        if let Err(e) = result {
            warn!("Failed to write to device: {}", e);
            self.teardown(&mut slot, &format!("Link fault, tearing down: {}", e))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::RecordingLink;
    use crate::core::bluetooth::recording::{ScanScript, ScriptedTransport, simulated_advertisement};
    use crate::core::device::DeviceType;
    use crate::core::queue::spawn_worker;

    fn entry() -> CatalogEntry {
        CatalogEntry {
            local_name: "G149".into(),
            display_name: "Cup".into(),
            device_type: DeviceType::ShakeTwo,
            is_ble_device: true,
            ..CatalogEntry::default()
        }
        .resolved()
    }

    fn manager() -> Arc<BluetoothManager> {
        Arc::new(BluetoothManager::new(Arc::new(CommandQueue::new())))
    }

    async fn settle(link: &RecordingLink, frames: usize) {
        for _ in 0..200 {
            if link.frames().len() >= frames {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} frames, saw {}", frames, link.frames().len());
    }

    #[tokio::test]
    async fn binding_is_exclusive() {
        let manager = manager();
        let first = RecordingLink::new();
        let second = RecordingLink::new();

        assert!(manager.try_begin_connect().await);
        assert!(!manager.try_begin_connect().await);
        assert!(manager.bind(&entry(), first, None).await);
        assert!(!manager.bind(&entry(), second, None).await);
        assert!(!manager.try_begin_connect().await);
        assert_eq!(manager.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_health_check_tears_down_and_clears_queue() {
        let manager = manager();
        let link = RecordingLink::new();
        let token = CancellationToken::new();
        manager.bind(&entry(), link.clone(), Some(token.clone())).await;
        manager.queue().enqueue(ActionOptions::default(), |_| {});

        link.set_connected(false);
        let mut slot = manager.lock().await;
        assert!(!manager.check_connection(&mut slot).await);
        assert!(!slot.is_bound());
        drop(slot);

        assert!(link.is_closed());
        assert!(token.is_cancelled());
        assert!(manager.queue().is_empty());
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert!(manager.try_begin_connect().await);
    }

    #[tokio::test]
    async fn worker_flushes_dirty_state_once() {
        let manager = manager();
        let link = RecordingLink::new();
        manager.bind(&entry(), link.clone(), None).await;
        let worker = spawn_worker(manager.queue().clone(), manager.clone());

        manager.queue().enqueue(ActionOptions::default(), |ctx| ctx.device.set_value_a(50));
        manager.queue().enqueue(ActionOptions::default(), |ctx| ctx.device.set_value_a(50));
        manager.queue().enqueue(ActionOptions::default(), |ctx| ctx.device.set_value_a(60));
        settle(&link, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let frames = link.decrypted_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][7], 65);
        assert_eq!(frames[1][7], 72);
        assert!(!manager.lock().await.device().unwrap().is_dirty());
        worker.abort();
    }

    #[tokio::test]
    async fn write_failure_is_reported_as_teardown() {
        let manager = manager();
        let link = RecordingLink::new();
        manager.bind(&entry(), link.clone(), None).await;
        link.set_fail_writes(true);
        let worker = spawn_worker(manager.queue().clone(), manager.clone());

        manager.queue().enqueue(ActionOptions::default(), |ctx| ctx.device.set_value_a(30));
        for _ in 0..200 {
            if !manager.lock().await.is_bound() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!manager.lock().await.is_bound());
        assert!(link.is_closed());
        worker.abort();
    }

    #[tokio::test]
    async fn actions_are_dropped_while_unbound() {
        let manager = manager();
        let worker = spawn_worker(manager.queue().clone(), manager.clone());
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        manager.queue().enqueue(ActionOptions::default(), move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst)
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        worker.abort();
    }

    #[tokio::test]
    async fn heat_echo_requeues_heat_command() {
        let manager = manager();
        let link = RecordingLink::new();
        manager.bind(&entry(), link.clone(), None).await;

        manager
            .apply_status(StatusReport::Status { battery: 80, heat_level: 1, led: 0 })
            .await;
        assert!(manager.queue().is_empty(), "mismatched echo is ignored");
        assert_eq!(manager.lock().await.device().unwrap().battery(), 80);

        manager
            .apply_status(StatusReport::Status { battery: 79, heat_level: 0, led: 0 })
            .await;
        assert_eq!(manager.queue().len(), 1);

        let worker = spawn_worker(manager.queue().clone(), manager.clone());
        settle(&link, 1).await;
        let frames = link.decrypted_frames();
        assert_eq!(&frames[0][1..7], &[0x5A, 0, 0, 1, 0x80, 0]);
        worker.abort();
    }

    const CATALOG: &str = r#"{"items": [
        {"localName": "G149", "displayName": "Cup", "deviceType": 1, "isBleDevice": true},
        {"localName": "G150", "displayName": "Far Cup", "deviceType": 1, "isBleDevice": true}
    ]}"#;

    fn start(manager: &Arc<BluetoothManager>, transport: &Arc<ScriptedTransport>) -> JoinHandle<()> {
        let config = BridgeConfig {
            scan_restart_delay_ms: 10,
            ..BridgeConfig::default()
        };
        manager.start(
            transport.clone(),
            Arc::new(DeviceCatalog::from_json_str(CATALOG)),
            &config,
        )
    }

    async fn wait_for(what: &str, condition: impl Fn() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    #[tokio::test]
    async fn advertised_device_is_connected_and_bound() {
        let manager = manager();
        let transport = ScriptedTransport::new(vec![ScanScript::Advertise(vec![simulated_advertisement("G149")])]);
        let discovery = start(&manager, &transport);
        let worker = spawn_worker(manager.queue().clone(), manager.clone());

        wait_for("connected", || manager.connection_state() == ConnectionState::Connected).await;
        assert_eq!(transport.connect_attempts(), vec!["G149".to_string()]);
        assert_eq!(
            manager.lock().await.device().unwrap().entry().display_name,
            "Cup"
        );

        manager.queue().enqueue(ActionOptions::default(), |ctx| ctx.device.set_value_a(50));
        let link = transport.links()[0].clone();
        settle(&link, 1).await;
        discovery.abort();
        worker.abort();
    }

    #[tokio::test]
    async fn advertisements_are_ignored_while_bound() {
        let manager = manager();
        let transport = ScriptedTransport::new(vec![ScanScript::Advertise(vec![
            simulated_advertisement("G149"),
            simulated_advertisement("G150"),
        ])]);
        let discovery = start(&manager, &transport);

        wait_for("stream restart", || transport.scan_calls() >= 2).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.connect_attempts(), vec!["G149".to_string()]);
        assert_eq!(manager.connection_state(), ConnectionState::Connected);
        discovery.abort();
    }

    #[tokio::test]
    async fn advertisements_are_ignored_while_connecting() {
        let manager = manager();
        assert!(manager.try_begin_connect().await);
        let transport = ScriptedTransport::new(vec![ScanScript::Advertise(vec![simulated_advertisement("G149")])]);
        let discovery = start(&manager, &transport);

        wait_for("stream restart", || transport.scan_calls() >= 2).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(transport.connect_attempts().is_empty());
        assert_eq!(manager.connection_state(), ConnectionState::Connecting);
        discovery.abort();
    }

    #[tokio::test]
    async fn failed_connect_frees_slot_for_next_advertisement() {
        let manager = manager();
        let transport = ScriptedTransport::new(vec![ScanScript::Advertise(vec![
            simulated_advertisement("G150"),
            simulated_advertisement("G149"),
        ])]);
        transport.set_unreachable("G150");
        let discovery = start(&manager, &transport);

        wait_for("connected", || manager.connection_state() == ConnectionState::Connected).await;
        assert_eq!(
            transport.connect_attempts(),
            vec!["G150".to_string(), "G149".to_string()]
        );
        assert_eq!(transport.links().len(), 1);
        assert_eq!(
            manager.lock().await.device().unwrap().entry().display_name,
            "Cup"
        );
        discovery.abort();
    }

    #[tokio::test]
    async fn failed_connect_returns_to_scanning() {
        let manager = manager();
        let transport = ScriptedTransport::new(vec![ScanScript::Advertise(vec![simulated_advertisement("G150")])]);
        transport.set_unreachable("G150");
        let discovery = start(&manager, &transport);

        wait_for("connect attempt", || !transport.connect_attempts().is_empty()).await;
        wait_for("scanning", || manager.connection_state() == ConnectionState::Scanning).await;
        assert!(!manager.lock().await.is_bound());
        discovery.abort();
    }
}
