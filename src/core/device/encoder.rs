//! Per-model intensity encoding
//! Maps a logical intensity (0-100) and the channel-enable flags onto the two
//! channel bytes of an intensity frame. Each hardware model scales differently.

use super::codec::{self, BODY_SENTINEL, CommandBody, Frame};
use super::types::{DeviceModel, DeviceState};

/// Command class byte for intensity frames
const INTENSITY_CLASS: u8 = 0x40;

/// Command class byte for heat frames (`i8::MIN` on the wire)
const HEAT_CLASS: u8 = 0x80;

/// Channel bytes as placed at body offsets 6 and 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBytes {
    pub a: u8,
    pub b: u8,
}

impl ChannelBytes {
    const OFF: Self = Self { a: 0, b: 0 };
}

/// Encodes the channel bytes for `model`.
///
/// `value` must already be clamped to `[0, 100]`.
pub fn encode_channels(
    model: DeviceModel,
    value: i32,
    enable_a: bool,
    enable_b: bool,
    is_strong: bool,
) -> ChannelBytes {
    match model {
        DeviceModel::Generic => encode_generic(value, enable_a, enable_b, is_strong),
        DeviceModel::G145 => encode_g145(value, enable_a, enable_b),
        DeviceModel::G149 => encode_g149(value, enable_a, enable_b),
    }
}

fn strong_scaled(value: i32) -> i32 {
    let v = f64::from(value);
    if v < 0.05 {
        0
    } else {
        (v * 0.01 * 60.0 + 40.0) as i32
    }
}

fn encode_generic(value: i32, enable_a: bool, enable_b: bool, is_strong: bool) -> ChannelBytes {
    let a = if is_strong { strong_scaled(value) } else { value };
    match (enable_a, enable_b) {
        (true, true) => ChannelBytes { a: a as u8, b: value as u8 },
        (true, false) => ChannelBytes { a: a as u8, b: 0 },
        (false, true) => ChannelBytes { a: 0, b: value as u8 },
        (false, false) => ChannelBytes::OFF,
    }
}

fn encode_g145(value: i32, enable_a: bool, enable_b: bool) -> ChannelBytes {
    let scaled = if value >= 30 {
        (f64::from(value) * 0.01 * 70.0 + 30.0) as i32
    } else {
        0
    };
    split_channels(value, scaled, enable_a, enable_b)
}

fn encode_g149(value: i32, enable_a: bool, enable_b: bool) -> ChannelBytes {
    let (primary, secondary) = if value > 0 {
        (
            (f64::from(value) * 0.01 * 70.0 + 30.0) as i32,
            (f64::from(value as f32) / 6.6 + 15.0) as i32,
        )
    } else {
        (value, value)
    };
    split_channels(primary, secondary, enable_a, enable_b)
}

fn split_channels(primary: i32, secondary: i32, enable_a: bool, enable_b: bool) -> ChannelBytes {
    match (enable_a, enable_b) {
        (true, true) => ChannelBytes { a: primary as u8, b: secondary as u8 },
        (true, false) => ChannelBytes { a: primary as u8, b: 0 },
        (false, true) => ChannelBytes { a: 0, b: secondary as u8 },
        (false, false) => ChannelBytes::OFF,
    }
}

pub fn intensity_body(channels: ChannelBytes) -> CommandBody {
    [
        BODY_SENTINEL,
        0,
        0,
        1,
        INTENSITY_CLASS,
        3,
        channels.a,
        channels.b,
        0,
        0,
    ]
}

pub fn heat_body(level: u8) -> CommandBody {
    [BODY_SENTINEL, 0, 0, 1, HEAT_CLASS, level, 0, 0, 0, 0]
}

/// Channel bytes for the current setpoints of `state`.
pub fn channels_for(state: &DeviceState) -> ChannelBytes {
    let entry = state.entry();
    encode_channels(
        entry.model,
        state.value_a().clamp(0, 100),
        state.channel_a(),
        state.channel_b(),
        entry.is_strong,
    )
}

/// Encrypted intensity frame for the current setpoints of `state`.
pub fn intensity_frame(state: &DeviceState) -> Frame {
    codec::assemble_body(&intensity_body(channels_for(state)))
}

/// Encrypted heat frame for `level`.
pub fn heat_frame(level: u8) -> Frame {
    codec::assemble_body(&heat_body(level))
}
