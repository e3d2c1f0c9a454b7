//! Device engine
//! Session-level glue between the transport layer and the device backends:
//! backend selection, the scan-state flag, the one-shot device-added
//! announcement and the last-known-device cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::config::device_cache::DeviceCache;
use crate::core::bridge::{DeviceBackend, GlobalKey, InputKey};
use crate::core::device::DeviceInfo;
use crate::core::device::descriptor::DeviceMessages;

/// Progress of a client's scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    NotScanning = 0,
    Scanning = 1,
    Announced = 2,
}

impl From<u8> for ScanState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NotScanning,
            1 => Self::Scanning,
            _ => Self::Announced,
        }
    }
}

/// Push sent once a device is available after scanning was requested
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceAdded {
    pub id: u32,
    pub device_index: u32,
    pub device_name: String,
    pub device_messages: DeviceMessages,
}

impl DeviceAdded {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            id: 0,
            device_index: 0,
            device_name: info.device_name,
            device_messages: info.device_messages,
        }
    }

    /// Control-protocol message: `[{"DeviceAdded": {...}}]`.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            #[serde(rename = "DeviceAdded")]
            device_added: &'a DeviceAdded,
        }
        serde_json::to_string(&[Wrapper { device_added: self }])
    }
}

struct Selection {
    selected: Option<usize>,
    last_serialized: Option<String>,
}

pub struct DeviceEngine {
    backends: Vec<Arc<dyn DeviceBackend>>,
    selection: Mutex<Selection>,
    scan_state: AtomicU8,
    cache: DeviceCache,
    announcements: mpsc::UnboundedSender<DeviceAdded>,
    probe_interval: Duration,
}

impl DeviceEngine {
    pub fn new(
        backends: Vec<Arc<dyn DeviceBackend>>,
        cache: DeviceCache,
        probe_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<DeviceAdded>) {
        let (announcements, announcements_rx) = mpsc::unbounded_channel();
        let engine = Self {
            backends,
            selection: Mutex::new(Selection {
                selected: None,
                last_serialized: None,
            }),
            scan_state: AtomicU8::new(ScanState::NotScanning as u8),
            cache,
            announcements,
            probe_interval,
        };
        (engine, announcements_rx)
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan_state.load(Ordering::SeqCst).into()
    }

    /// Starting a scan from idle arms the announcement; any other call retires it.
    pub fn set_scanning_state(&self, start: bool) {
        let next = if start && self.scan_state() == ScanState::NotScanning {
            ScanState::Scanning
        } else {
            ScanState::Announced
        };
        self.scan_state.store(next as u8, Ordering::SeqCst);
        debug!("Scan state is now {:?}", next);
    }

    /// Selected backend, re-selecting the first live one when the current one went away.
    async fn live_backend(&self) -> Option<(Arc<dyn DeviceBackend>, DeviceInfo)> {
        let mut selection = self.selection.lock().await;
        if let Some(index) = selection.selected {
            if let Some(info) = self.backends[index].get_snapshot().await {
                return Some((self.backends[index].clone(), info));
            }
        }
        for (index, backend) in self.backends.iter().enumerate() {
            if let Some(info) = backend.get_snapshot().await {
                selection.selected = Some(index);
                return Some((backend.clone(), info));
            }
        }
        selection.selected = None;
        None
    }

    /// Live snapshot, cached on change. Falls back to the cached one when offline.
    pub async fn get_device_snapshot(&self) -> Option<DeviceInfo> {
        if let Some((_, info)) = self.live_backend().await {
            match serde_json::to_string(&info) {
                Ok(serialized) => {
                    let mut selection = self.selection.lock().await;
                    if selection.last_serialized.as_deref() != Some(serialized.as_str())
                        && self.cache.save(&serialized).await
                    {
                        selection.last_serialized = Some(serialized);
                    }
                }
                Err(e) => warn!("Failed to serialize device snapshot: {}", e),
            }
            return Some(info);
        }

        let (info, raw) = self.cache.load_fallback().await?;
        self.selection.lock().await.last_serialized = Some(raw);
        Some(info)
    }

    pub async fn execute_command(&self, name: &str, payload: &Value) {
        if let Some((backend, _)) = self.live_backend().await {
            backend.execute_command(name, payload).await;
        }
    }

    pub async fn stop_device(&self) {
        if let Some((backend, _)) = self.live_backend().await {
            backend.stop().await;
        }
    }

    pub async fn execute_input_key(&self, key: InputKey) {
        for backend in &self.backends {
            backend.execute_input_key(key).await;
        }
    }

    pub async fn execute_global_key(&self, key: GlobalKey, is_down: bool) {
        for backend in &self.backends {
            backend.execute_global_key(key, is_down).await;
        }
    }

    /// Polls for a device while scanning and announces the first one found.
    pub fn spawn_presence_probe(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                if engine.scan_state() == ScanState::Scanning {
                    if let Some(info) = engine.get_device_snapshot().await {
                        info!("Announcing device {}", info.device_name);
                        if engine.announcements.send(DeviceAdded::new(info)).is_err() {
                            warn!("Nobody is listening for device announcements");
                        }
                        engine
                            .scan_state
                            .store(ScanState::Announced as u8, Ordering::SeqCst);
                    }
                }
                if engine.scan_state() == ScanState::Announced {
                    debug!("Presence probe finished");
                    return;
                }
                tokio::time::sleep(engine.probe_interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeBackend {
        snapshot: StdMutex<Option<DeviceInfo>>,
        commands: StdMutex<Vec<String>>,
    }

    impl FakeBackend {
        fn set_snapshot(&self, name: Option<&str>) {
            *self.snapshot.lock().unwrap() = name.map(|n| DeviceInfo {
                device_name: n.to_string(),
                device_messages: DeviceMessages::default(),
            });
        }
    }

    #[async_trait]
    impl DeviceBackend for FakeBackend {
        async fn get_snapshot(&self) -> Option<DeviceInfo> {
            self.snapshot.lock().unwrap().clone()
        }
        async fn execute_command(&self, name: &str, _payload: &Value) {
            self.commands.lock().unwrap().push(name.to_string());
        }
        async fn execute_input_key(&self, _key: InputKey) {}
        async fn execute_global_key(&self, _key: GlobalKey, _is_down: bool) {}
        async fn stop(&self) {
            self.commands.lock().unwrap().push("stop".to_string());
        }
    }

    fn cache(name: &str) -> DeviceCache {
        DeviceCache::new(std::env::temp_dir().join(format!(
            "galaku-bridge-engine-{}-{}.json",
            std::process::id(),
            name
        )))
    }

    fn engine(
        backend: &Arc<FakeBackend>,
        name: &str,
    ) -> (Arc<DeviceEngine>, mpsc::UnboundedReceiver<DeviceAdded>) {
        let (engine, rx) = DeviceEngine::new(
            vec![backend.clone() as Arc<dyn DeviceBackend>],
            cache(name),
            Duration::from_millis(10),
        );
        (Arc::new(engine), rx)
    }

    #[test]
    fn scan_state_transitions() {
        let backend = Arc::new(FakeBackend::default());
        let (engine, _rx) = engine(&backend, "flags");
        assert_eq!(engine.scan_state(), ScanState::NotScanning);
        engine.set_scanning_state(true);
        assert_eq!(engine.scan_state(), ScanState::Scanning);
        engine.set_scanning_state(true);
        assert_eq!(engine.scan_state(), ScanState::Announced);
    }

    #[test]
    fn stop_before_start_retires_the_announcement() {
        let backend = Arc::new(FakeBackend::default());
        let (engine, _rx) = engine(&backend, "retire");
        engine.set_scanning_state(false);
        assert_eq!(engine.scan_state(), ScanState::Announced);
    }

    #[test]
    fn device_added_message_shape() {
        let added = DeviceAdded::new(DeviceInfo {
            device_name: "Cup".into(),
            device_messages: DeviceMessages::default(),
        });
        let json: Value = serde_json::from_str(&added.to_message().unwrap()).unwrap();
        assert_eq!(json[0]["DeviceAdded"]["Id"], 0);
        assert_eq!(json[0]["DeviceAdded"]["DeviceIndex"], 0);
        assert_eq!(json[0]["DeviceAdded"]["DeviceName"], "Cup");
        assert!(json[0]["DeviceAdded"]["DeviceMessages"].is_object());
    }

    #[tokio::test]
    async fn presence_announces_exactly_once() {
        let backend = Arc::new(FakeBackend::default());
        let (engine, mut rx) = engine(&backend, "probe");
        let _ = std::fs::remove_file(engine.cache.path());
        engine.set_scanning_state(true);
        let probe = engine.spawn_presence_probe();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());

        backend.set_snapshot(Some("Cup"));
        probe.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().device_name, "Cup");
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.scan_state(), ScanState::Announced);
        let _ = std::fs::remove_file(engine.cache.path());
    }

    #[tokio::test]
    async fn snapshot_is_cached_and_used_offline() {
        let backend = Arc::new(FakeBackend::default());
        let (engine, _rx) = engine(&backend, "fallback");
        let _ = std::fs::remove_file(engine.cache.path());
        assert!(engine.get_device_snapshot().await.is_none());

        backend.set_snapshot(Some("Cup"));
        assert_eq!(engine.get_device_snapshot().await.unwrap().device_name, "Cup");

        backend.set_snapshot(None);
        assert_eq!(engine.get_device_snapshot().await.unwrap().device_name, "Cup");

        engine.execute_command("ScalarCmd", &Value::Null).await;
        engine.stop_device().await;
        assert!(backend.commands.lock().unwrap().is_empty(), "cached snapshot never drives a link");
        let _ = std::fs::remove_file(engine.cache.path());
    }

    #[tokio::test]
    async fn commands_reach_the_live_backend() {
        let backend = Arc::new(FakeBackend::default());
        let (engine, _rx) = engine(&backend, "live");
        backend.set_snapshot(Some("Cup"));
        engine.execute_command("ScalarCmd", &Value::Null).await;
        engine.stop_device().await;
        assert_eq!(*backend.commands.lock().unwrap(), ["ScalarCmd", "stop"]);
        let _ = std::fs::remove_file(engine.cache.path());
    }
}
