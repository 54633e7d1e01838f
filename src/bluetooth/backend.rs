use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::BackendError;

/// Primary service of the Soundcore protocol. Only the bits covered by
/// [`SERVICE_UUID_MASK`] are compared, the vendor prefix varies by model.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x011cf5da_0000_1000_8000_00805f9b34fb);
pub const SERVICE_UUID_MASK: u128 = 0x0000FFFF_FFFF_FFFF_FFFF_FFFFFFFFFFFF;
/// Characteristic commands are written to.
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00007777_0000_1000_8000_00805f9b34fb);
/// Characteristic notifications arrive on.
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00008888_0000_1000_8000_00805f9b34fb);

pub fn is_soundcore_service(uuid: Uuid) -> bool {
    uuid.as_u128() & SERVICE_UUID_MASK == SERVICE_UUID.as_u128() & SERVICE_UUID_MASK
}

/// Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl FromStr for MacAddr {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BackendError::Other(format!("invalid Bluetooth address: {}", s));
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = BackendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(value: MacAddr) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// A bonded device as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub mac_address: MacAddr,
}

/// Access to the platform Bluetooth stack.
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// All bonded devices known to the adapter.
    async fn bonded_devices(&self) -> Result<Vec<ConnectionDescriptor>, BackendError>;

    async fn find_bonded(
        &self,
        mac: MacAddr,
    ) -> Result<Option<ConnectionDescriptor>, BackendError> {
        Ok(self
            .bonded_devices()
            .await?
            .into_iter()
            .find(|d| d.mac_address == mac))
    }

    /// Open a GATT connection. Services may not be resolved yet.
    async fn connect_gatt(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn GattHandle>, BackendError>;
}

/// A GATT connection to one device.
///
/// `disconnect` and `close` are synchronous so they can run from `Drop`.
#[async_trait]
pub trait GattHandle: Send + Sync {
    /// Resolves once services have been discovered.
    async fn wait_until_ready(&self) -> Result<(), BackendError>;

    /// The protocol service UUID, if the device exposes one.
    async fn service_uuid(&self) -> Result<Option<Uuid>, BackendError>;

    /// Set up the command/notification characteristics of `service`.
    async fn open_link(&self, service: Uuid) -> Result<OpenedLink, BackendError>;

    /// Flips to `true` when the device goes away.
    fn disconnected(&self) -> watch::Receiver<bool>;

    fn disconnect(&self);

    fn close(&self);
}

/// A command link plus the raw notification bytes it produces.
pub struct OpenedLink {
    pub link: Arc<dyn GattLink>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
pub trait GattLink: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), BackendError>;

    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "ac:12:2F:6A:D2:07".parse().unwrap();
        assert_eq!(mac.0, [0xAC, 0x12, 0x2F, 0x6A, 0xD2, 0x07]);
        assert_eq!(mac.to_string(), "AC:12:2F:6A:D2:07");
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert!("AC:12:2F:6A:D2".parse::<MacAddr>().is_err());
        assert!("AC:12:2F:6A:D2:07:00".parse::<MacAddr>().is_err());
        assert!("AC:12:2F:6A:D2:ZZ".parse::<MacAddr>().is_err());
        assert!("+1:12:2F:6A:D2:07".parse::<MacAddr>().is_err());
        assert!("AC:12:2F:6A:D2:-7".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_service_uuid_mask() {
        assert!(is_soundcore_service(SERVICE_UUID));
        let other_vendor = Uuid::from_u128(0x7f1cf5da_0000_1000_8000_00805f9b34fb);
        assert!(is_soundcore_service(other_vendor));
        assert!(!is_soundcore_service(WRITE_CHARACTERISTIC_UUID));
    }
}
