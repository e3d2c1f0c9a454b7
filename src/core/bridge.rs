//! Command bridge
//! Maps control-protocol commands and operator keys onto device state mutations
//! and queued link actions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::core::bluetooth::BluetoothManager;
use crate::core::device::{DeviceInfo, DeviceType, motion};
use crate::core::queue::{ActionOptions, CommandQueue};

/// Discrete operator keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    /// Toggle channel A ("slap")
    Z,
    /// Toggle channel B ("vibrate")
    X,
    /// Toggle scalar / linear mode
    C,
    /// Toggle heat
    V,
    /// Intensity -5
    A,
    /// Intensity +5
    S,
    /// Any other key, only prints the state line
    Other,
}

impl InputKey {
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_uppercase() {
            'Z' => Self::Z,
            'X' => Self::X,
            'C' => Self::C,
            'V' => Self::V,
            'A' => Self::A,
            'S' => Self::S,
            _ => Self::Other,
        }
    }
}

/// Keys watched for burst mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKey {
    Q,
    W,
    E,
}

/// A device family the engine can drive
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Capability snapshot of the live device, if any
    async fn get_snapshot(&self) -> Option<DeviceInfo>;

    async fn execute_command(&self, name: &str, payload: &Value);

    async fn execute_input_key(&self, key: InputKey);

    async fn execute_global_key(&self, key: GlobalKey, is_down: bool);

    async fn stop(&self);

    /// Called once after a device binds
    async fn on_connected(&self) {}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScalarCmd {
    scalars: Vec<ScalarSubcommand>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScalarSubcommand {
    scalar: f64,
    #[serde(default)]
    actuator_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LinearCmd {
    vectors: Vec<VectorSubcommand>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VectorSubcommand {
    duration: u32,
    position: f64,
}

impl ScalarCmd {
    /// First Vibrate scalar, else the first scalar.
    fn pick(&self) -> Option<f64> {
        self.scalars
            .iter()
            .find(|s| s.actuator_type == "Vibrate")
            .or_else(|| self.scalars.first())
            .map(|s| s.scalar)
    }
}

#[derive(Debug, Default)]
struct InputState {
    linear_mode: bool,
    burst_mode: bool,
    key_q: bool,
    key_w: bool,
    key_e: bool,
}

impl InputState {
    fn held(&self) -> usize {
        [self.key_q, self.key_w, self.key_e]
            .iter()
            .filter(|held| **held)
            .count()
    }
}

const INPUT_KEY_USAGE: &str = "Keys Z, X, C, V toggle slap, vibrate, deeper-is-stronger mode and heat. \
Keys A and S lower and raise the intensity. Hold any two of Q, W, E to enter burst mode, \
release all three to calm down. Any other key prints the current state.";

/// Drives Galaku devices bound through the Bluetooth manager
pub struct GalakuBackend {
    manager: Arc<BluetoothManager>,
    input: Mutex<InputState>,
    step_interval: Duration,
}

impl GalakuBackend {
    pub fn new(manager: Arc<BluetoothManager>, step_interval: Duration) -> Self {
        Self {
            manager,
            input: Mutex::new(InputState::default()),
            step_interval,
        }
    }

    fn input(&self) -> MutexGuard<'_, InputState> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> &CommandQueue {
        self.manager.queue()
    }

    pub fn is_linear_mode(&self) -> bool {
        self.input().linear_mode
    }

    pub fn print_input_key_usage(&self) {
        info!("{}", INPUT_KEY_USAGE);
    }

    fn queue_scalar(&self, payload: &Value) {
        let command = match ScalarCmd::deserialize(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring malformed ScalarCmd: {}", e);
                return;
            }
        };
        let Some(scalar) = command.pick() else {
            warn!("Ignoring ScalarCmd without scalars");
            return;
        };
        let value = ((100.0 * scalar).round_ties_even() as i32).clamp(0, 100);
        self.queue()
            .enqueue(ActionOptions::superseding(), move |ctx| ctx.device.set_value_a(value));
    }

    fn queue_linear(&self, payload: &Value) {
        let command = match LinearCmd::deserialize(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring malformed LinearCmd: {}", e);
                return;
            }
        };
        let Some(vector) = command.vectors.first() else {
            warn!("Ignoring LinearCmd without vectors");
            return;
        };
        let (position, duration) = (vector.position, vector.duration);
        let step = self.step_interval;
        let step_ms = step.as_millis() as u32;

        self.queue()
            .enqueue(ActionOptions::superseding().skip_flush(), move |ctx| {
                let start = f64::from(ctx.device.value_a()) / 100.0;
                for sample in motion::interpolate(start, position, duration, step_ms) {
                    let value = (sample * 100.0).round_ties_even() as i32;
                    ctx.queue.enqueue(ActionOptions::default().with_delay(step), move |ctx| {
                        ctx.device.set_value_a(value)
                    });
                }
            });
    }

    fn queue_halt(&self) {
        self.queue().enqueue(ActionOptions::superseding(), |ctx| {
            ctx.device.set_value_a(0);
            ctx.device.set_channel_a(false);
            ctx.device.set_channel_b(false);
        });
    }
}

#[async_trait]
impl DeviceBackend for GalakuBackend {
    async fn get_snapshot(&self) -> Option<DeviceInfo> {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return None;
        }
        slot.device().and_then(DeviceInfo::for_device)
    }

    async fn execute_command(&self, name: &str, payload: &Value) {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return;
        }
        let Some(device) = slot.device() else {
            return;
        };
        if device.entry().device_type != DeviceType::ShakeTwo {
            return;
        }

        let linear_mode = self.is_linear_mode();
        match (name, linear_mode) {
            ("ScalarCmd", false) => self.queue_scalar(payload),
            ("LinearCmd", true) => self.queue_linear(payload),
            ("ScalarCmd", true) | ("LinearCmd", false) => {
                debug!("Ignoring {} in {} mode", name, if linear_mode { "linear" } else { "scalar" });
            }
            _ => debug!("Ignoring unsupported command {}", name),
        }
    }

    async fn execute_input_key(&self, key: InputKey) {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return;
        }
        let Some(device) = slot.device_mut() else {
            return;
        };

        let linear_mode = {
            let mut input = self.input();
            if input.burst_mode {
                return;
            }
            if key == InputKey::C {
                input.linear_mode = !input.linear_mode;
                info!(
                    "{}",
                    if input.linear_mode { "Deeper-is-stronger mode" } else { "Scalar intensity mode" }
                );
            }
            input.linear_mode
        };

        let front = ActionOptions::default().at_index(0);
        match key {
            InputKey::Z => self.queue().enqueue(front, |ctx| {
                let enabled = !ctx.device.channel_a();
                ctx.device.set_channel_a(enabled);
                info!("Slap {}", if enabled { "on" } else { "off" });
            }),
            InputKey::X => self.queue().enqueue(front, |ctx| {
                let enabled = !ctx.device.channel_b();
                ctx.device.set_channel_b(enabled);
                info!("Vibrate {}", if enabled { "on" } else { "off" });
            }),
            InputKey::V => {
                let level = if device.hot_level() != 0 { 0 } else { 1 };
                device.set_hot_level(level);
                info!("Heat level set to {}", level);
                self.queue()
                    .enqueue(front.skip_flush(), move |ctx| ctx.request_heat(level));
            }
            InputKey::A | InputKey::S => {
                let delta = if key == InputKey::A { -5 } else { 5 };
                self.queue().enqueue(front, move |ctx| {
                    let value = (ctx.device.value_a() + delta).clamp(0, 100);
                    ctx.device.set_value_a(value);
                    info!("{} intensity to {}", if delta < 0 { "Lowered" } else { "Raised" }, value);
                });
            }
            InputKey::C | InputKey::Other => {}
        }

        self.queue()
            .enqueue(ActionOptions::default().at_index(1), move |ctx| {
                let device = &ctx.device;
                info!(
                    "Current state: slap={} vibrate={} intensity={} deeper_mode={} heat={} battery={}",
                    device.channel_a(),
                    device.channel_b(),
                    device.value_a(),
                    linear_mode,
                    device.hot_level(),
                    device.battery_text()
                );
            });
    }

    async fn execute_global_key(&self, key: GlobalKey, is_down: bool) {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return;
        }

        let mut input = self.input();
        match key {
            GlobalKey::Q => input.key_q = is_down,
            GlobalKey::W => input.key_w = is_down,
            GlobalKey::E => input.key_e = is_down,
        }
        let held = input.held();
        if held >= 2 && !input.burst_mode {
            input.burst_mode = true;
            info!("Entering burst mode");
        }
        if !input.burst_mode {
            return;
        }

        if held == 0 {
            input.burst_mode = false;
            info!("Calming down");
            self.queue_halt();
        } else {
            self.queue().enqueue(ActionOptions::superseding(), |ctx| {
                ctx.device.set_value_a(100);
                ctx.device.set_channel_a(true);
                ctx.device.set_channel_b(true);
            });
        }
    }

    async fn stop(&self) {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return;
        }
        self.queue_halt();
    }

    async fn on_connected(&self) {
        let mut slot = self.manager.lock().await;
        if !self.manager.check_connection(&mut slot).await {
            return;
        }
        let Some(device) = slot.device() else {
            return;
        };
        if device.entry().device_type != DeviceType::ShakeTwo {
            return;
        }

        self.print_input_key_usage();
        let level = device.hot_level();
        self.queue()
            .enqueue(ActionOptions::default().skip_flush(), move |ctx| ctx.request_heat(level));
        self.queue().enqueue(ActionOptions::default(), |_| {});
    }
}
