//! Capability descriptors reported to control-protocol clients.

use serde::{Deserialize, Serialize};

use super::types::{DeviceState, DeviceType};

/// Step resolution advertised for every supported command family
pub const STEP_COUNT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureDescriptor {
    pub step_count: u32,
    pub feature_descriptor: String,
    pub actuator_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceMessages {
    #[serde(rename = "ScalarCmd", default, skip_serializing_if = "Vec::is_empty")]
    pub scalar_cmd: Vec<FeatureDescriptor>,
    #[serde(rename = "LinearCmd", default, skip_serializing_if = "Vec::is_empty")]
    pub linear_cmd: Vec<FeatureDescriptor>,
}

/// Snapshot of the bound device as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_messages: DeviceMessages,
}

impl DeviceInfo {
    /// Descriptor for the bound device, or `None` when its model is not actuated.
    pub fn for_device(state: &DeviceState) -> Option<Self> {
        let entry = state.entry();
        match entry.device_type {
            DeviceType::ShakeTwo => Some(Self {
                device_name: entry.display_name.clone(),
                device_messages: DeviceMessages {
                    scalar_cmd: vec![FeatureDescriptor {
                        step_count: STEP_COUNT,
                        feature_descriptor: "Vibration intensity, 0~100".to_string(),
                        actuator_type: "Vibrate".to_string(),
                    }],
                    linear_cmd: vec![FeatureDescriptor {
                        step_count: STEP_COUNT,
                        feature_descriptor: "Linear stroke depth, 0~100".to_string(),
                        actuator_type: "Position".to_string(),
                    }],
                },
            }),
            _ => None,
        }
    }
}
