use crate::error::DecodeError;

use super::checksum::checksum;
use super::commands::CommandId;

/// Direction prefix of frames sent to the device.
pub const OUTBOUND_PREFIX: [u8; 5] = [0x08, 0xEE, 0x00, 0x00, 0x00];
/// Direction prefix of frames received from the device.
pub const INBOUND_PREFIX: [u8; 5] = [0x09, 0xFF, 0x00, 0x00, 0x01];

/// Header (prefix + command + length) plus the trailing checksum byte.
const FRAME_OVERHEAD: usize = 5 + 2 + 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn prefix(&self) -> [u8; 5] {
        match self {
            Self::Outbound => OUTBOUND_PREFIX,
            Self::Inbound => INBOUND_PREFIX,
        }
    }

    pub fn from_prefix(prefix: [u8; 5]) -> Option<Self> {
        match prefix {
            OUTBOUND_PREFIX => Some(Self::Outbound),
            INBOUND_PREFIX => Some(Self::Inbound),
            _ => None,
        }
    }
}

/// A Soundcore BLE protocol frame.
///
/// Wire format:
/// ```text
/// [direction: 5 bytes] [command: 2 bytes] [length: 2 bytes LE] [body...] [checksum: 1 byte]
/// ```
///
/// `length` is the size of the whole frame, checksum included. The checksum
/// is the wrapping byte sum of everything before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundcorePacket {
    pub direction: Direction,
    pub command: CommandId,
    pub body: Vec<u8>,
}

impl SoundcorePacket {
    pub fn outbound(command: CommandId, body: Vec<u8>) -> Self {
        Self {
            direction: Direction::Outbound,
            command,
            body,
        }
    }

    pub fn inbound(command: CommandId, body: Vec<u8>) -> Self {
        Self {
            direction: Direction::Inbound,
            command,
            body,
        }
    }

    /// Serialize this packet to bytes for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = (FRAME_OVERHEAD + self.body.len()) as u16;
        let mut result = Vec::with_capacity(length as usize);
        result.extend_from_slice(&self.direction.prefix());
        result.extend_from_slice(&self.command);
        result.extend_from_slice(&length.to_le_bytes());
        result.extend_from_slice(&self.body);
        result.push(checksum(&result));
        result
    }

    /// Parse a frame, validating direction, length and checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(DecodeError::TooShort(data.len()));
        }

        let mut prefix = [0u8; 5];
        prefix.copy_from_slice(&data[..5]);
        let direction = Direction::from_prefix(prefix).ok_or(DecodeError::BadDirection(prefix))?;

        let declared = u16::from_le_bytes([data[7], data[8]]) as usize;
        if declared != data.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let (frame, found) = data.split_at(data.len() - 1);
        let computed = checksum(frame);
        if computed != found[0] {
            return Err(DecodeError::ChecksumMismatch {
                computed,
                found: found[0],
            });
        }

        Ok(Self {
            direction,
            command: [data[5], data[6]],
            body: frame[9..].to_vec(),
        })
    }
}

impl std::fmt::Display for SoundcorePacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arrow = match self.direction {
            Direction::Outbound => "->",
            Direction::Inbound => "<-",
        };
        write!(
            f,
            "{} cmd={:02X}{:02X} body={}",
            arrow,
            self.command[0],
            self.command[1],
            hex(&self.body)
        )
    }
}

pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_state_format() {
        let bytes = SoundcorePacket::outbound([0x01, 0x01], Vec::new()).to_bytes();
        assert_eq!(
            bytes,
            vec![0x08, 0xEE, 0x00, 0x00, 0x00, 0x01, 0x01, 0x0A, 0x00, 0x02]
        );
    }

    #[test]
    fn test_parse_inbound_ack() {
        let data = [0x09, 0xFF, 0x00, 0x00, 0x01, 0x06, 0x81, 0x0A, 0x00, 0x9A];
        let pkt = SoundcorePacket::from_bytes(&data).unwrap();
        assert_eq!(pkt.direction, Direction::Inbound);
        assert_eq!(pkt.command, [0x06, 0x81]);
        assert!(pkt.body.is_empty());
    }

    #[test]
    fn test_roundtrip_keeps_body() {
        let pkt = SoundcorePacket::inbound([0x01, 0x03], vec![0x03, 0x04]);
        let parsed = SoundcorePacket::from_bytes(&pkt.to_bytes()).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            SoundcorePacket::from_bytes(&[0x09, 0xFF]),
            Err(DecodeError::TooShort(2))
        );
    }

    #[test]
    fn test_bad_direction() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x81, 0x0A, 0x00, 0x00];
        assert!(matches!(
            SoundcorePacket::from_bytes(&data),
            Err(DecodeError::BadDirection(_))
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let data = [0x09, 0xFF, 0x00, 0x00, 0x01, 0x06, 0x81, 0x0B, 0x00, 0x9B];
        assert_eq!(
            SoundcorePacket::from_bytes(&data),
            Err(DecodeError::LengthMismatch {
                declared: 11,
                actual: 10
            })
        );
    }

    #[test]
    fn test_checksum_validation_fails_on_corrupt() {
        let mut bytes = SoundcorePacket::inbound([0x06, 0x81], Vec::new()).to_bytes();
        let len = bytes.len();
        bytes[len - 1] ^= 0xFF;
        assert!(matches!(
            SoundcorePacket::from_bytes(&bytes),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }
}
