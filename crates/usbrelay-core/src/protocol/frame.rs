//! Frame encoding/decoding
//!
//! Implements the addressed binary frame format used by the relay modules:
//!
//! - 1 byte: sentinel (0xA0)
//! - 1 byte: device address
//! - 1 byte: command code
//! - N bytes: payload (fixed width per command and direction)
//! - 1 byte: checksum (8-bit sum of all preceding bytes, mod 256)

use serde::{Deserialize, Serialize};

use super::{ProtocolError, SENTINEL};

/// Smallest possible frame: sentinel, address, command, checksum
pub const MIN_FRAME_LEN: usize = 4;

/// Commands understood by the relay modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCode {
    /// Switch a single channel on or off; payload `[channel, state]`,
    /// echoed by the device on success
    SetChannel,

    /// Read all channel states; empty request payload, reply payload is a
    /// one-byte channel bitmask
    QueryStatus,

    /// Switch all channels at once; payload is a one-byte bitmask, echoed
    /// by the device on success
    SetAll,
}

impl CommandCode {
    /// Get the on-wire command byte
    pub fn wire_byte(&self) -> u8 {
        match self {
            CommandCode::SetChannel => 0x01,
            CommandCode::QueryStatus => 0x05,
            CommandCode::SetAll => 0x0a,
        }
    }

    /// Look up a command from its on-wire byte
    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandCode::SetChannel),
            0x05 => Some(CommandCode::QueryStatus),
            0x0a => Some(CommandCode::SetAll),
            _ => None,
        }
    }

    /// Fixed payload width for the given direction
    pub fn payload_len(&self, kind: FrameKind) -> usize {
        match (self, kind) {
            (CommandCode::SetChannel, _) => 2,
            (CommandCode::QueryStatus, FrameKind::Request) => 0,
            (CommandCode::QueryStatus, FrameKind::Reply) => 1,
            (CommandCode::SetAll, _) => 1,
        }
    }
}

/// Direction of a frame on the wire
///
/// The payload width of `QueryStatus` differs between the two directions,
/// so decoding needs to know which side of the exchange the bytes belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Host to device
    Request,
    /// Device to host
    Reply,
}

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address of the device this frame targets or originates from
    pub address: u8,
    /// Command code
    pub command: CommandCode,
    /// Payload bytes; width fixed by `command` and direction
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a request frame, validating the payload width for the command
    pub fn request(
        address: u8,
        command: CommandCode,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        let expected = command.payload_len(FrameKind::Request);
        if payload.len() != expected {
            return Err(ProtocolError::InvalidPayload {
                command,
                expected,
                actual: payload.len(),
            });
        }
        Ok(Self {
            address,
            command,
            payload,
        })
    }

    /// Encode the frame to raw bytes, appending the checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + self.payload.len());
        bytes.push(SENTINEL);
        bytes.push(self.address);
        bytes.push(self.command.wire_byte());
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        bytes
    }

    /// Decode a frame from raw bytes
    ///
    /// The slice must contain exactly one frame of the width implied by its
    /// command byte and `kind`. This is the primary defense against line
    /// noise and partial reads: anything that fails here is discarded by the
    /// session, which keeps scanning the incoming stream.
    pub fn decode(data: &[u8], kind: FrameKind) -> Result<Self, ProtocolError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} bytes, need at least {}",
                data.len(),
                MIN_FRAME_LEN
            )));
        }

        if data[0] != SENTINEL {
            return Err(ProtocolError::MalformedFrame(format!(
                "bad sentinel {:#04x}",
                data[0]
            )));
        }

        let command = CommandCode::from_wire_byte(data[2]).ok_or_else(|| {
            ProtocolError::MalformedFrame(format!("unknown command byte {:#04x}", data[2]))
        })?;

        let expected_len = Self::encoded_len(command, kind);
        if data.len() != expected_len {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} bytes for {:?} {:?}, expected {}",
                data.len(),
                command,
                kind,
                expected_len
            )));
        }

        let expected_sum = checksum(&data[..data.len() - 1]);
        let actual_sum = data[data.len() - 1];
        if expected_sum != actual_sum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: expected_sum,
                actual: actual_sum,
            });
        }

        Ok(Self {
            address: data[1],
            command,
            payload: data[3..data.len() - 1].to_vec(),
        })
    }

    /// Total encoded size of a frame for the given command and direction
    pub fn encoded_len(command: CommandCode, kind: FrameKind) -> usize {
        MIN_FRAME_LEN + command.payload_len(kind)
    }
}

/// 8-bit wraparound sum of all bytes preceding the checksum byte
///
/// Must match bit-for-bit what the physical devices compute.
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_roundtrip_all_commands() {
        let frames = [
            Frame::request(0x01, CommandCode::SetChannel, vec![0x02, 0x01]).unwrap(),
            Frame::request(0x01, CommandCode::QueryStatus, vec![]).unwrap(),
            Frame::request(0x7f, CommandCode::SetAll, vec![0b0101]).unwrap(),
        ];
        for original in frames {
            let encoded = original.encode();
            let decoded = Frame::decode(&encoded, FrameKind::Request).unwrap();
            assert_eq!(original, decoded);
        }
    }

    #[test]
    fn test_reply_roundtrip() {
        let reply = Frame {
            address: 0x03,
            command: CommandCode::QueryStatus,
            payload: vec![0b0100],
        };
        let decoded = Frame::decode(&reply.encode(), FrameKind::Reply).unwrap();
        assert_eq!(reply, decoded);
    }

    #[test]
    fn test_checksum_matches_documented_formula() {
        // [0xA0, 0x01, 0x01, 0x02, 0x01] sums to 0xA5
        let frame = Frame::request(0x01, CommandCode::SetChannel, vec![0x02, 0x01]).unwrap();
        let encoded = frame.encode();
        assert_eq!(encoded, vec![0xa0, 0x01, 0x01, 0x02, 0x01, 0xa5]);
    }

    #[test]
    fn test_wrong_payload_length() {
        let err = Frame::request(0x01, CommandCode::SetChannel, vec![0x02]).unwrap_err();
        match err {
            ProtocolError::InvalidPayload {
                command,
                expected,
                actual,
            } => {
                assert_eq!(command, CommandCode::SetChannel);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_too_short() {
        let err = Frame::decode(&[0xa0, 0x01], FrameKind::Reply).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_bad_sentinel() {
        let mut encoded = Frame::request(0x01, CommandCode::QueryStatus, vec![])
            .unwrap()
            .encode();
        encoded[0] = 0x55;
        let err = Frame::decode(&encoded, FrameKind::Request).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_unknown_command() {
        let bytes = [0xa0u8, 0x01, 0x77, 0x18];
        let err = Frame::decode(&bytes, FrameKind::Request).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_corrupt_payload_fails_checksum() {
        let frame = Frame::request(0x01, CommandCode::SetChannel, vec![0x02, 0x01]).unwrap();
        let mut encoded = frame.encode();
        // Corrupt the payload but leave the checksum byte untouched
        encoded[3] ^= 0x04;
        let err = Frame::decode(&encoded, FrameKind::Request).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_single_bit_flips_detected() {
        let frame = Frame::request(0x05, CommandCode::SetAll, vec![0b1010]).unwrap();
        let encoded = frame.encode();
        // Flip every bit of every non-checksum byte in turn; the additive
        // checksum catches all single-bit corruption.
        for byte_idx in 0..encoded.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = encoded.clone();
                corrupted[byte_idx] ^= 1 << bit;
                assert!(
                    Frame::decode(&corrupted, FrameKind::Request).is_err(),
                    "flip of byte {byte_idx} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn test_checksum_wraps() {
        let frame = Frame::request(0xfd, CommandCode::SetAll, vec![0xff]).unwrap();
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded, FrameKind::Request).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_query_status_widths_differ_by_direction() {
        assert_eq!(Frame::encoded_len(CommandCode::QueryStatus, FrameKind::Request), 4);
        assert_eq!(Frame::encoded_len(CommandCode::QueryStatus, FrameKind::Reply), 5);
    }
}
