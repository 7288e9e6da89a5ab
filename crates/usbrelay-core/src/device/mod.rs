//! Relay device model
//!
//! Static device profiles, channel states, and the controller that drives a
//! device through a [`crate::protocol::CommandSession`].

pub mod controller;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

pub use controller::RelayController;

/// Lowest valid device address on the bus
pub const MIN_ADDRESS: u8 = 0x01;

/// Highest valid device address on the bus
pub const MAX_ADDRESS: u8 = 0xfd;

/// State of one relay channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    /// Relay open
    Off,
    /// Relay closed
    On,
}

impl RelayState {
    /// On-wire byte for SET_CHANNEL payloads
    pub fn wire_byte(&self) -> u8 {
        match self {
            RelayState::Off => 0x00,
            RelayState::On => 0x01,
        }
    }

    /// The opposite state
    pub fn inverted(&self) -> Self {
        match self {
            RelayState::Off => RelayState::On,
            RelayState::On => RelayState::Off,
        }
    }

    fn from_bit(set: bool) -> Self {
        if set {
            RelayState::On
        } else {
            RelayState::Off
        }
    }
}

/// Static metadata describing one physical relay module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Bus address of the module
    pub address: u8,
    /// Number of controllable channels (1, 2, or 4)
    pub channel_count: u8,
}

impl DeviceProfile {
    /// Create a profile, validating address range and channel count
    pub fn new(address: u8, channel_count: u8) -> Result<Self, ProtocolError> {
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&address) {
            return Err(ProtocolError::InvalidArgument(format!(
                "device address {address:#04x} outside {MIN_ADDRESS:#04x}..={MAX_ADDRESS:#04x}"
            )));
        }
        if !matches!(channel_count, 1 | 2 | 4) {
            return Err(ProtocolError::InvalidArgument(format!(
                "unsupported channel count {channel_count}, modules have 1, 2, or 4 channels"
            )));
        }
        Ok(Self {
            address,
            channel_count,
        })
    }
}

/// Last device-confirmed state of every channel on one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Bus address of the module
    pub address: u8,
    /// Channel states, index 0 holding channel 1
    pub channels: Vec<RelayState>,
}

impl DeviceSnapshot {
    /// Build a snapshot from a reply bitmask; bit `i` holds channel `i + 1`,
    /// bits past `channel_count` are ignored
    pub fn from_bitmask(address: u8, channel_count: u8, mask: u8) -> Self {
        let channels = (0..channel_count)
            .map(|bit| RelayState::from_bit(mask & (1 << bit) != 0))
            .collect();
        Self { address, channels }
    }

    /// Pack the channel states back into a bitmask
    pub fn bitmask(&self) -> u8 {
        self.channels
            .iter()
            .enumerate()
            .fold(0u8, |mask, (bit, state)| match state {
                RelayState::On => mask | (1 << bit),
                RelayState::Off => mask,
            })
    }

    /// State of a 1-based channel index
    pub fn channel(&self, index: u8) -> Option<RelayState> {
        if index == 0 {
            return None;
        }
        self.channels.get(usize::from(index) - 1).copied()
    }
}

/// Pack a slice of channel states into a SET_ALL bitmask
pub fn states_to_bitmask(states: &[RelayState]) -> u8 {
    states
        .iter()
        .enumerate()
        .fold(0u8, |mask, (bit, state)| match state {
            RelayState::On => mask | (1 << bit),
            RelayState::Off => mask,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_validation() {
        assert!(DeviceProfile::new(0x01, 4).is_ok());
        assert!(DeviceProfile::new(0x00, 4).is_err());
        assert!(DeviceProfile::new(0xfe, 4).is_err());
        assert!(DeviceProfile::new(0x01, 3).is_err());
        assert!(DeviceProfile::new(0x01, 0).is_err());
    }

    #[test]
    fn test_snapshot_from_bitmask() {
        let snapshot = DeviceSnapshot::from_bitmask(0x01, 4, 0b0100);
        assert_eq!(
            snapshot.channels,
            vec![
                RelayState::Off,
                RelayState::Off,
                RelayState::On,
                RelayState::Off
            ]
        );
        assert_eq!(snapshot.channel(3), Some(RelayState::On));
        assert_eq!(snapshot.channel(0), None);
        assert_eq!(snapshot.channel(5), None);
        assert_eq!(snapshot.bitmask(), 0b0100);
    }

    #[test]
    fn test_bitmask_ignores_bits_past_channel_count() {
        let snapshot = DeviceSnapshot::from_bitmask(0x01, 2, 0b1111);
        assert_eq!(snapshot.channels.len(), 2);
        assert_eq!(snapshot.bitmask(), 0b0011);
    }

    #[test]
    fn test_relay_state_wire() {
        assert_eq!(RelayState::On.wire_byte(), 0x01);
        assert_eq!(RelayState::Off.wire_byte(), 0x00);
        assert_eq!(RelayState::On.inverted(), RelayState::Off);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = DeviceSnapshot::from_bitmask(0x02, 2, 0b01);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: DeviceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
