//! In-memory link and transport used by tests and offline runs.
//! `RecordingLink` records every frame written and can simulate a dropped connection
//! or failing writes. `ScriptedTransport` replays scripted scans and hands out
//! recording links on connect.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use crate::core::bluetooth::commands::DeviceLink;
use crate::core::bluetooth::transport::{Advertisement, BleTransport, Connection};
use crate::core::device::codec;
use crate::core::device::Frame;
use crate::core::error::LinkError;

pub struct RecordingLink {
    frames: Mutex<Vec<Frame>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl RecordingLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Encrypted frames in write order
    pub fn frames(&self) -> Vec<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Written frames after decryption
    pub fn decrypted_frames(&self) -> Vec<Frame> {
        self.frames().iter().map(codec::decrypt).collect()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceLink for RecordingLink {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.is_closed()
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), LinkError> {
        if !self.is_connected().await {
            return Err(LinkError::NotConnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::WriteFailed("simulated write failure".into()));
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*frame);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// What one call to [`ScriptedTransport::scan`] produces
pub enum ScanScript {
    /// The scan fails to start
    Fail,
    /// The scan yields these advertisements, then the stream ends
    Advertise(Vec<Advertisement<String>>),
}

/// Builds an advertisement for a simulated device named `name`.
pub fn simulated_advertisement(name: &str) -> Advertisement<String> {
    Advertisement {
        device: name.to_string(),
        id: format!("sim-{}", name),
        local_name: Some(name.to_string()),
        rssi: Some(-50),
    }
}

/// Scripted [`BleTransport`]. Once the script runs out, scans stay open without
/// yielding anything.
pub struct ScriptedTransport {
    scans: Mutex<VecDeque<ScanScript>>,
    scan_calls: AtomicUsize,
    unreachable: Mutex<HashSet<String>>,
    connects: Mutex<Vec<String>>,
    links: Mutex<Vec<Arc<RecordingLink>>>,
}

impl ScriptedTransport {
    pub fn new(scans: Vec<ScanScript>) -> Arc<Self> {
        Arc::new(Self {
            scans: Mutex::new(scans.into()),
            scan_calls: AtomicUsize::new(0),
            unreachable: Mutex::new(HashSet::new()),
            connects: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
        })
    }

    /// Makes every connect attempt to `device` fail.
    pub fn set_unreachable(&self, device: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.to_string());
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Devices passed to `connect`, in call order
    pub fn connect_attempts(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Links handed out by successful connects
    pub fn links(&self) -> Vec<Arc<RecordingLink>> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BleTransport for ScriptedTransport {
    type Device = String;

    async fn scan(&self) -> Result<BoxStream<'_, Advertisement<String>>, LinkError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .scans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(ScanScript::Fail) => Err(LinkError::ScanFailed("simulated adapter failure".into())),
            Some(ScanScript::Advertise(advertisements)) => Ok(stream::iter(advertisements).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn connect(&self, device: &String) -> Result<Connection> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device.clone());
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(device);
        if unreachable {
            return Err(anyhow!("simulated connect failure for {}", device));
        }

        let link = RecordingLink::new();
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(link.clone());
        Ok(Connection {
            link,
            notify_characteristics: Vec::new(),
        })
    }
}
