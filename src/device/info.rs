use serde::{Deserialize, Serialize};

/// Firmware version in `MM.mm` form as transmitted by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub const WIRE_LEN: usize = 5;

    /// Parse five ASCII bytes such as `02.30`.
    pub fn from_ascii(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        let (major, minor) = text.split_once('.')?;
        if major.len() != 2 || minor.len() != 2 {
            return None;
        }
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}.{:02}", self.major, self.minor)
    }
}

/// Firmware versions of both earcups. Single-unit devices only fill `left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DualFirmwareVersion {
    pub left: Option<FirmwareVersion>,
    pub right: Option<FirmwareVersion>,
}

impl DualFirmwareVersion {
    /// Parse two five-byte versions. An all-zero half means that side is absent.
    pub fn from_ascii(data: &[u8]) -> Option<Self> {
        if data.len() != FirmwareVersion::WIRE_LEN * 2 {
            return None;
        }
        let (left, right) = data.split_at(FirmwareVersion::WIRE_LEN);
        let side = |half: &[u8]| -> Option<Option<FirmwareVersion>> {
            if half.iter().all(|&b| b == 0) {
                Some(None)
            } else {
                FirmwareVersion::from_ascii(half).map(Some)
            }
        };
        Some(Self {
            left: side(left)?,
            right: side(right)?,
        })
    }
}

/// 16 character ASCII serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub const WIRE_LEN: usize = 16;

    pub fn from_ascii(data: &[u8]) -> Option<Self> {
        if data.len() != Self::WIRE_LEN || !data.is_ascii() {
            return None;
        }
        std::str::from_utf8(data).ok().map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hear ID metadata carried in full state updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearIdInfo {
    pub gender: u8,
    pub age_range: u8,
    pub enabled: bool,
    pub left: Vec<i16>,
    pub right: Vec<i16>,
    pub time: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_parse() {
        let fw = FirmwareVersion::from_ascii(b"02.30").unwrap();
        assert_eq!(fw, FirmwareVersion { major: 2, minor: 30 });
        assert_eq!(fw.to_string(), "02.30");
        assert!(FirmwareVersion::from_ascii(b"0230.").is_none());
    }

    #[test]
    fn test_dual_firmware_absent_side() {
        let mut data = b"12.34".to_vec();
        data.extend_from_slice(&[0; 5]);
        let fw = DualFirmwareVersion::from_ascii(&data).unwrap();
        assert_eq!(fw.left, Some(FirmwareVersion { major: 12, minor: 34 }));
        assert_eq!(fw.right, None);
    }

    #[test]
    fn test_serial_number() {
        let sn = SerialNumber::from_ascii(b"0123456789ABCDEF").unwrap();
        assert_eq!(sn.as_str(), "0123456789ABCDEF");
        assert!(SerialNumber::from_ascii(b"short").is_none());
    }
}
