//! # usbrelay-core
//!
//! Core library for controlling USB-to-serial relay modules (1/2/4-channel
//! variants) speaking a fixed binary command/response protocol.
//!
//! This library provides:
//! - Frame encoding/decoding with checksum validation
//! - A command session with retries, timeouts, and cancellation over an
//!   injectable transport
//! - A relay controller tracking device-confirmed channel state
//!
//! ## Example
//!
//! ```rust,ignore
//! use usbrelay_core::prelude::*;
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", None)?;
//! let session = CommandSession::new(Box::new(transport), SessionConfig::default());
//! let mut relays = RelayController::with_profiles(session, [DeviceProfile::new(0x01, 4)?]);
//!
//! relays.set_channel(0x01, 2, RelayState::On)?;
//! let snapshot = relays.query_status(0x01)?;
//! println!("channel states: {:?}", snapshot.channels);
//! ```

#![warn(missing_docs)]

pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{DeviceProfile, DeviceSnapshot, RelayController, RelayState};
    pub use crate::protocol::{
        CancelToken, CommandCode, CommandSession, Frame, FrameKind, ProtocolError,
        SerialTransport, SessionConfig, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
