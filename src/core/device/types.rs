//! Catalog entries and the live device state they produce.

use serde::{Deserialize, Serialize};

/// Hardware family codes used by the device catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum DeviceType {
    #[default]
    ShakeOne,
    ShakeTwo,
    ShakeAndPump,
    ShakeAndDianji,
    ShakeTwoAndDianji,
    ShakeAndDianji2,
    XiAndChouCha,
    ChouCha,
    ShakeThree,
    /// A code this build does not know how to drive
    Unknown(i32),
}

impl From<i32> for DeviceType {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::ShakeOne,
            1 => Self::ShakeTwo,
            2 => Self::ShakeAndPump,
            3 => Self::ShakeAndDianji,
            4 => Self::ShakeTwoAndDianji,
            5 => Self::ShakeAndDianji2,
            6 => Self::XiAndChouCha,
            7 => Self::ChouCha,
            8 => Self::ShakeThree,
            other => Self::Unknown(other),
        }
    }
}

impl From<DeviceType> for i32 {
    fn from(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::ShakeOne => 0,
            DeviceType::ShakeTwo => 1,
            DeviceType::ShakeAndPump => 2,
            DeviceType::ShakeAndDianji => 3,
            DeviceType::ShakeTwoAndDianji => 4,
            DeviceType::ShakeAndDianji2 => 5,
            DeviceType::XiAndChouCha => 6,
            DeviceType::ChouCha => 7,
            DeviceType::ShakeThree => 8,
            DeviceType::Unknown(code) => code,
        }
    }
}

/// Intensity encoding variant, resolved from the advertised local name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceModel {
    #[default]
    Generic,
    G145,
    G149,
}

impl DeviceModel {
    pub fn from_local_name(local_name: &str) -> Self {
        match local_name {
            "G145" => Self::G145,
            "G149" => Self::G149,
            _ => Self::Generic,
        }
    }
}

/// Static metadata for one supported device, as read from the catalog
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogEntry {
    /// Name the device advertises over BLE
    pub local_name: String,
    /// Human readable name reported to clients
    pub display_name: String,
    pub device_type: DeviceType,
    pub is_hot_device: bool,
    pub is_ble_device: bool,
    /// Number of motors ("mada")
    pub mada_count: u8,
    pub is_strong: bool,
    #[serde(skip)]
    pub model: DeviceModel,
}

impl CatalogEntry {
    /// Resolves the encoding variant from the local name.
    pub fn resolved(mut self) -> Self {
        self.model = DeviceModel::from_local_name(&self.local_name);
        self
    }

    pub fn can_show_ab_floating(&self) -> bool {
        matches!(
            self.device_type,
            DeviceType::ShakeAndDianji | DeviceType::ShakeAndDianji2
        ) || matches!(self.mada_count, 2 | 3)
    }

    pub fn is_pump_device(&self) -> bool {
        self.device_type == DeviceType::ShakeAndPump
    }

    /// Produces a live state for a freshly connected device, all channels enabled.
    pub fn instantiate(&self) -> DeviceState {
        DeviceState {
            entry: self.clone(),
            channel_a: true,
            channel_b: true,
            channel_c: true,
            value_a: 0,
            value_b: 0,
            value_c: 0,
            dianji_frequency: 0,
            dianji_intensity: 0,
            hot_level: 0,
            dirty: false,
            battery: 100,
            last_heat_observed: None,
        }
    }
}

/// Live configuration of the bound device.
///
/// Every setpoint setter raises the dirty flag when the value actually changes.
/// Only the command queue's flush step clears it.
#[derive(Debug, Clone)]
pub struct DeviceState {
    entry: CatalogEntry,
    channel_a: bool,
    channel_b: bool,
    channel_c: bool,
    value_a: i32,
    value_b: i32,
    value_c: i32,
    dianji_frequency: i32,
    dianji_intensity: i32,
    hot_level: u8,
    dirty: bool,
    battery: u8,
    last_heat_observed: Option<u8>,
}

macro_rules! setpoint {
    ($getter:ident, $setter:ident, $ty:ty) => {
        pub fn $getter(&self) -> $ty {
            self.$getter
        }

        pub fn $setter(&mut self, value: $ty) {
            if self.$getter != value {
                self.$getter = value;
                self.dirty = true;
            }
        }
    };
}

impl DeviceState {
    setpoint!(channel_a, set_channel_a, bool);
    setpoint!(channel_b, set_channel_b, bool);
    setpoint!(channel_c, set_channel_c, bool);
    setpoint!(value_a, set_value_a, i32);
    setpoint!(value_b, set_value_b, i32);
    setpoint!(value_c, set_value_c, i32);
    setpoint!(dianji_frequency, set_dianji_frequency, i32);
    setpoint!(dianji_intensity, set_dianji_intensity, i32);
    // Heat is a setpoint too: toggling it also flushes one intensity frame.
    setpoint!(hot_level, set_hot_level, u8);

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Sets both motor channels from a normalized intensity.
    pub fn set_intensity(&mut self, intensity: f32) {
        let value = ((100.0 * intensity) as i32).clamp(0, 100);
        self.set_value_a(value);
        self.set_value_b(value);
        self.set_dianji_frequency(4);
        self.set_dianji_intensity((intensity * 6.0).ceil() as i32);
        self.dirty = true;
    }

    pub fn battery(&self) -> u8 {
        self.battery
    }

    pub(crate) fn set_battery(&mut self, battery: u8) {
        self.battery = battery;
    }

    pub fn last_heat_observed(&self) -> Option<u8> {
        self.last_heat_observed
    }

    pub(crate) fn set_last_heat_observed(&mut self, level: u8) {
        self.last_heat_observed = Some(level);
    }

    pub fn battery_text(&self) -> String {
        format!("{}%", self.battery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(local_name: &str) -> CatalogEntry {
        CatalogEntry {
            local_name: local_name.to_string(),
            display_name: "Test".to_string(),
            device_type: DeviceType::ShakeTwo,
            is_ble_device: true,
            ..CatalogEntry::default()
        }
        .resolved()
    }

    #[test]
    fn model_resolved_from_local_name() {
        assert_eq!(entry("G145").model, DeviceModel::G145);
        assert_eq!(entry("G149").model, DeviceModel::G149);
        assert_eq!(entry("G100").model, DeviceModel::Generic);
    }

    #[test]
    fn instantiate_enables_all_channels_without_dirtying() {
        let state = entry("G149").instantiate();
        assert!(state.channel_a() && state.channel_b() && state.channel_c());
        assert!(!state.is_dirty());
        assert_eq!(state.battery(), 100);
    }

    #[test]
    fn setpoint_change_raises_dirty_and_reads_do_not_clear() {
        let mut state = entry("G149").instantiate();
        state.set_value_a(0);
        assert!(!state.is_dirty(), "unchanged value must not dirty the state");

        state.set_value_a(40);
        assert!(state.is_dirty());
        let _ = state.value_a();
        assert!(state.is_dirty());

        state.clear_dirty();
        state.set_channel_b(false);
        assert!(state.is_dirty());
    }

    #[test]
    fn telemetry_does_not_dirty() {
        let mut state = entry("G149").instantiate();
        state.set_battery(42);
        state.set_last_heat_observed(1);
        assert!(!state.is_dirty());
        assert_eq!(state.battery_text(), "42%");
    }

    #[test]
    fn set_intensity_scales_and_always_dirties() {
        let mut state = entry("G145").instantiate();
        state.set_intensity(0.5);
        assert_eq!(state.value_a(), 50);
        assert_eq!(state.value_b(), 50);
        assert_eq!(state.dianji_frequency(), 4);
        assert_eq!(state.dianji_intensity(), 3);

        state.clear_dirty();
        state.set_intensity(0.5);
        assert!(state.is_dirty());

        state.set_intensity(2.0);
        assert_eq!(state.value_a(), 100);
    }

    #[test]
    fn catalog_helpers() {
        let mut e = entry("G1");
        assert!(!e.can_show_ab_floating());
        e.mada_count = 2;
        assert!(e.can_show_ab_floating());
        e.mada_count = 1;
        e.device_type = DeviceType::ShakeAndDianji2;
        assert!(e.can_show_ab_floating());
        e.device_type = DeviceType::ShakeAndPump;
        assert!(e.is_pump_device());
    }

    #[test]
    fn device_type_codes_round_trip_through_json() {
        let e: CatalogEntry = serde_json::from_str(
            r#"{"localName":"G149","displayName":"Cup","deviceType":1,"isBleDevice":true,"madaCount":2}"#,
        )
        .unwrap();
        assert_eq!(e.device_type, DeviceType::ShakeTwo);
        assert!(!e.is_strong);
        assert_eq!(DeviceType::from(42), DeviceType::Unknown(42));
    }
}
