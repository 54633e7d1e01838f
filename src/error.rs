use thiserror::Error;

use crate::bluetooth::backend::MacAddr;
use crate::protocol::commands::CommandId;

/// Errors returned by the Bluetooth backend (adapter, GATT, characteristics).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),
    #[error("{0}")]
    Other(String),
}

/// Fatal errors of a single connection attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no bonded device with address {mac}")]
    DeviceNotFound { mac: MacAddr },
    #[error("device does not expose a supported GATT service")]
    ServiceNotFound,
    #[error("device did not become ready in time")]
    ReadinessTimeout,
    #[error("no state update after {attempts} request(s)")]
    StateRequestTimeout { attempts: u32 },
    #[error("failed to open command link: {source}")]
    TransportConstruction {
        #[source]
        source: BackendError,
    },
    #[error("device disconnected during handshake")]
    Disconnected,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An inbound frame that could not be decoded. Never fatal for a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("unexpected direction bytes {0:02x?}")]
    BadDirection([u8; 5]),
    #[error("length field {declared} does not match packet size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: computed {computed:02x}, packet has {found:02x}")]
    ChecksumMismatch { computed: u8, found: u8 },
    #[error("invalid body for command {:02x}{:02x}: {reason}", .command[0], .command[1])]
    InvalidBody { command: CommandId, reason: String },
}

impl DecodeError {
    pub(crate) fn body(command: CommandId, reason: impl Into<String>) -> Self {
        Self::InvalidBody {
            command,
            reason: reason.into(),
        }
    }
}

/// Errors from write-intent operations on a live session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has been destroyed")]
    Destroyed,
    #[error("device does not support {0}")]
    FeatureNotSupported(&'static str),
    #[error("command queue closed")]
    QueueClosed,
}
