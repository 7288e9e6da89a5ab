//! Relay protocol communication
//!
//! Implements the addressed binary frame protocol spoken by the USB-to-serial
//! relay modules: frame coding with an additive checksum, and the command
//! session that turns sends over an unreliable byte stream into confirmed,
//! retried, timed-out exchanges.

pub mod error;
pub mod frame;
pub mod mock;
pub mod session;
pub mod transport;

pub use error::ProtocolError;
pub use frame::{CommandCode, Frame, FrameKind};
pub use mock::MockTransport;
pub use session::{CancelToken, CommandSession, SessionConfig};
pub use transport::{SerialTransport, Transport};

/// Start-of-frame marker every frame begins with
pub const SENTINEL: u8 = 0xa0;

/// Default baud rate for relay module communication
pub const DEFAULT_BAUD_RATE: u32 = 9600;
