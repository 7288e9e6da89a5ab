//! Protocol errors

use thiserror::Error;

use super::frame::CommandCode;

/// Errors that can occur during relay protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Local validation failure; never touches the wire
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Wrong payload width for a command at encode time; never touches the wire
    #[error("invalid payload for {command:?}: expected {expected} bytes, got {actual}")]
    InvalidPayload {
        /// Command whose payload width was violated
        command: CommandCode,
        /// Width the command requires
        expected: usize,
        /// Width actually supplied
        actual: usize,
    },

    /// Received bytes too short, missing the sentinel, or carrying an unknown
    /// command byte
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame well-formed but the recomputed checksum disagrees with the
    /// trailing byte
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum recomputed over the received bytes
        expected: u8,
        /// Checksum byte the frame carried
        actual: u8,
    },

    /// All retry attempts exhausted without a valid matching reply
    #[error("no response from device after {attempts} attempts")]
    NoResponse {
        /// Number of transmissions performed before giving up
        attempts: u32,
    },

    /// Device replied validly but with content inconsistent with the request
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Caller aborted the exchange before completion
    #[error("command cancelled")]
    Cancelled,

    /// Transport-level I/O failure (port closed, device unplugged); never
    /// retried by the session
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
