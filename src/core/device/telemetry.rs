//! Decoding of inbound status notifications.

use super::types::DeviceState;

/// Message class byte (index 2) of a long battery report
const BATTERY_REPORT_CLASS: u8 = 12;

/// Message class byte (index 2) of a status report (`-79` signed)
const STATUS_REPORT_CLASS: u8 = 0xB1;

/// Length from which a decrypted notification is a long report
const LONG_REPORT_LEN: usize = 16;

/// A decoded status notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReport {
    Battery(u8),
    Status { battery: u8, heat_level: u8, led: u8 },
    Unknown,
}

/// Decodes a decrypted notification.
pub fn decode_status(plain: &[u8]) -> StatusReport {
    if plain.len() >= LONG_REPORT_LEN {
        if plain[2] == BATTERY_REPORT_CLASS {
            return StatusReport::Battery(plain[3]);
        }
    } else if plain.len() >= 12 && plain[2] == STATUS_REPORT_CLASS {
        return StatusReport::Status {
            battery: plain[4],
            heat_level: plain[6],
            led: plain[9],
        };
    }
    StatusReport::Unknown
}

impl DeviceState {
    /// Applies a status report to the telemetry fields.
    ///
    /// Returns true when the report echoes the commanded heat level.
    pub fn apply_status(&mut self, report: StatusReport) -> bool {
        match report {
            StatusReport::Battery(battery) => {
                self.set_battery(battery);
                false
            }
            StatusReport::Status {
                battery,
                heat_level,
                led: _,
            } => {
                self.set_battery(battery);
                if heat_level == self.hot_level() {
                    self.set_last_heat_observed(heat_level);
                    true
                } else {
                    false
                }
            }
            StatusReport::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::types::CatalogEntry;

    fn status(battery: u8, heat: u8) -> Vec<u8> {
        let mut plain = vec![0u8; 12];
        plain[2] = STATUS_REPORT_CLASS;
        plain[4] = battery;
        plain[6] = heat;
        plain[9] = 0x55;
        plain
    }

    #[test]
    fn decodes_long_battery_report() {
        let mut plain = vec![0u8; 16];
        plain[2] = 12;
        plain[3] = 64;
        assert_eq!(decode_status(&plain), StatusReport::Battery(64));

        plain[2] = 0xB1;
        assert_eq!(decode_status(&plain), StatusReport::Unknown);
    }

    #[test]
    fn decodes_status_report() {
        assert_eq!(
            decode_status(&status(80, 1)),
            StatusReport::Status {
                battery: 80,
                heat_level: 1,
                led: 0x55
            }
        );
        assert_eq!(decode_status(&[0u8; 12]), StatusReport::Unknown);
        assert_eq!(decode_status(&[0u8; 4]), StatusReport::Unknown);
    }

    #[test]
    fn heat_echo_only_applied_when_matching() {
        let mut state = CatalogEntry::default().instantiate();
        state.set_hot_level(1);
        state.clear_dirty();

        assert!(!state.apply_status(decode_status(&status(70, 0))));
        assert_eq!(state.battery(), 70);
        assert_eq!(state.last_heat_observed(), None);

        assert!(state.apply_status(decode_status(&status(69, 1))));
        assert_eq!(state.last_heat_observed(), Some(1));
        assert!(!state.is_dirty());
    }
}
