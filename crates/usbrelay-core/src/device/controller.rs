//! Relay controller
//!
//! Domain-facing API over a [`CommandSession`]: switch channels, read status,
//! and keep a cache of the last device-confirmed channel states. The cache is
//! only ever mutated after a confirmed reply; a command that cannot be
//! confirmed is never assumed to have succeeded.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::protocol::{CancelToken, CommandCode, CommandSession, Frame, ProtocolError};

use super::{states_to_bitmask, DeviceProfile, DeviceSnapshot, RelayState};

/// High-level interface to the relay modules reachable through one session
pub struct RelayController {
    session: CommandSession,
    cancel: CancelToken,
    profiles: HashMap<u8, DeviceProfile>,
    snapshots: HashMap<u8, DeviceSnapshot>,
}

impl RelayController {
    /// Create a controller with no registered device profiles
    pub fn new(session: CommandSession) -> Self {
        Self {
            session,
            cancel: CancelToken::new(),
            profiles: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Create a controller pre-populated with device profiles
    pub fn with_profiles(
        session: CommandSession,
        profiles: impl IntoIterator<Item = DeviceProfile>,
    ) -> Self {
        let mut controller = Self::new(session);
        for profile in profiles {
            controller.add_profile(profile);
        }
        controller
    }

    /// Register a device profile, replacing any previous one for its address
    pub fn add_profile(&mut self, profile: DeviceProfile) {
        self.profiles.insert(profile.address, profile);
    }

    /// Profile registered for an address, if any
    pub fn profile(&self, address: u8) -> Option<&DeviceProfile> {
        self.profiles.get(&address)
    }

    /// Addresses of all registered devices, sorted
    pub fn known_addresses(&self) -> Vec<u8> {
        let mut addresses: Vec<u8> = self.profiles.keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    /// Last device-confirmed snapshot for an address, if one exists
    pub fn cached_snapshot(&self, address: u8) -> Option<&DeviceSnapshot> {
        self.snapshots.get(&address)
    }

    /// Token that aborts the in-flight exchange when cancelled
    ///
    /// Cancellation is sticky; call [`CancelToken::reset`] on the handle
    /// before issuing further commands.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Switch one channel on or off
    ///
    /// Succeeds only when the device echoes the requested channel and state;
    /// a valid reply with different content fails with `UnexpectedReply` and
    /// leaves the cache untouched.
    pub fn set_channel(
        &mut self,
        address: u8,
        channel: u8,
        state: RelayState,
    ) -> Result<(), ProtocolError> {
        self.require_channel(address, channel)?;

        let request = Frame::request(
            address,
            CommandCode::SetChannel,
            vec![channel, state.wire_byte()],
        )?;
        let reply = self.session.transact_with_cancel(&request, &self.cancel)?;

        if reply.payload != request.payload {
            return Err(ProtocolError::UnexpectedReply(format!(
                "device {address:#04x} confirmed {:02x?} instead of {:02x?}",
                reply.payload, request.payload
            )));
        }

        // Confirmed: reflect the new state in an existing snapshot. Never
        // fabricate a snapshot here, the other channels are still unread.
        if let Some(slot) = self
            .snapshots
            .get_mut(&address)
            .and_then(|snapshot| snapshot.channels.get_mut(usize::from(channel) - 1))
        {
            *slot = state;
        }
        debug!(address, channel, ?state, "channel confirmed");
        Ok(())
    }

    /// Read all channel states, replacing the cached snapshot wholesale
    pub fn query_status(&mut self, address: u8) -> Result<DeviceSnapshot, ProtocolError> {
        let profile = self.require_profile(address)?;
        let channel_count = profile.channel_count;

        let request = Frame::request(address, CommandCode::QueryStatus, Vec::new())?;
        let reply = self.session.transact_with_cancel(&request, &self.cancel)?;

        let snapshot = DeviceSnapshot::from_bitmask(address, channel_count, reply.payload[0]);
        debug!(address, mask = reply.payload[0], "status read");
        self.snapshots.insert(address, snapshot.clone());
        Ok(snapshot)
    }

    /// Switch every channel at once from a full slice of states
    pub fn set_all(&mut self, address: u8, states: &[RelayState]) -> Result<(), ProtocolError> {
        let profile = self.require_profile(address)?;
        if states.len() != usize::from(profile.channel_count) {
            return Err(ProtocolError::InvalidArgument(format!(
                "{} states for device {address:#04x} with {} channels",
                states.len(),
                profile.channel_count
            )));
        }

        let mask = states_to_bitmask(states);
        let request = Frame::request(address, CommandCode::SetAll, vec![mask])?;
        let reply = self.session.transact_with_cancel(&request, &self.cancel)?;

        if reply.payload != [mask] {
            return Err(ProtocolError::UnexpectedReply(format!(
                "device {address:#04x} confirmed mask {:#010b} instead of {mask:#010b}",
                reply.payload[0]
            )));
        }

        // Echo covers every channel, so the snapshot is fully confirmed
        self.snapshots.insert(
            address,
            DeviceSnapshot {
                address,
                channels: states.to_vec(),
            },
        );
        debug!(address, mask, "all channels confirmed");
        Ok(())
    }

    /// Flip one channel to the opposite of its current state
    ///
    /// Uses the cached state when available, otherwise reads the device
    /// first. Returns the confirmed new state.
    pub fn toggle(&mut self, address: u8, channel: u8) -> Result<RelayState, ProtocolError> {
        self.require_channel(address, channel)?;

        let current = match self
            .cached_snapshot(address)
            .and_then(|snapshot| snapshot.channel(channel))
        {
            Some(state) => state,
            None => self
                .query_status(address)?
                .channel(channel)
                .ok_or_else(|| {
                    ProtocolError::UnexpectedReply(format!(
                        "status for device {address:#04x} does not cover channel {channel}"
                    ))
                })?,
        };

        let target = current.inverted();
        self.set_channel(address, channel, target)?;
        Ok(target)
    }

    /// Power-cycle one channel: off, hold, on (flipped when `reverse`)
    ///
    /// Each leg is a confirmed `set_channel`; a failed first leg leaves the
    /// channel in its commanded state rather than silently restoring it.
    pub fn pulse(
        &mut self,
        address: u8,
        channel: u8,
        hold: Duration,
        reverse: bool,
    ) -> Result<(), ProtocolError> {
        let first = if reverse {
            RelayState::On
        } else {
            RelayState::Off
        };
        self.set_channel(address, channel, first)?;
        std::thread::sleep(hold);
        self.set_channel(address, channel, first.inverted())
    }

    fn require_profile(&self, address: u8) -> Result<DeviceProfile, ProtocolError> {
        self.profiles.get(&address).copied().ok_or_else(|| {
            ProtocolError::InvalidArgument(format!("no profile for device {address:#04x}"))
        })
    }

    /// Local channel validation; must run before any frame is built so that
    /// `InvalidArgument` never touches the wire
    fn require_channel(&self, address: u8, channel: u8) -> Result<DeviceProfile, ProtocolError> {
        let profile = self.require_profile(address)?;
        if channel == 0 || channel > profile.channel_count {
            return Err(ProtocolError::InvalidArgument(format!(
                "channel {channel} out of range 1..={} for device {address:#04x}",
                profile.channel_count
            )));
        }
        Ok(profile)
    }
}
