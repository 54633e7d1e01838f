pub mod backend;
pub mod bluez;
pub mod demo;
pub mod scanner;
pub mod transport;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::device::session::DeviceSession;
use crate::error::ConnectError;
use crate::protocol::outbound::encode_request_state;
use crate::protocol::{Packet, StateUpdate};
use backend::{BleBackend, ConnectionDescriptor, GattHandle, MacAddr};
use transport::{CommandQueue, Notifications};

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    AwaitingReady,
    RequestingInitialState,
    Ready,
    Failed,
    Disconnected,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Disconnected)
    }
}

/// Everything a successful handshake produced.
pub(crate) struct Handshake {
    pub descriptor: ConnectionDescriptor,
    pub gatt: Arc<dyn GattHandle>,
    pub queue: Arc<CommandQueue>,
    pub notifications: Notifications,
    pub update: StateUpdate,
}

/// Releases whatever a connection attempt opened, unless defused.
///
/// Runs on error paths and when the connect future is dropped mid-flight.
struct ReleaseGuard {
    gatt: Option<Arc<dyn GattHandle>>,
    queue: Option<Arc<CommandQueue>>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ReleaseGuard {
    fn new(state: Arc<watch::Sender<ConnectionState>>) -> Self {
        Self {
            gatt: None,
            queue: None,
            state,
        }
    }

    fn release(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        if let Some(gatt) = self.gatt.take() {
            debug!("Releasing GATT connection");
            gatt.disconnect();
            gatt.close();
        }
    }

    fn defuse(&mut self) {
        self.queue = None;
        self.gatt = None;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.gatt.is_none() && self.queue.is_none() {
            return;
        }
        self.release();
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                info!("Connection attempt abandoned in state {:?}", state);
                *state = ConnectionState::Disconnected;
                true
            }
        });
    }
}

/// Connects to a bonded device and hands back a live session.
pub struct ConnectionManager {
    backend: Arc<dyn BleBackend>,
    config: SessionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn BleBackend>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            backend,
            config,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run one connection attempt.
    ///
    /// Every failure, and dropping the returned future before it resolves,
    /// disconnects and closes whatever was opened. Nothing is retried here
    /// except the initial state request.
    pub async fn connect(&self, mac: MacAddr) -> Result<DeviceSession, ConnectError> {
        let mut guard = ReleaseGuard::new(self.state.clone());
        match self.handshake(mac, &mut guard).await {
            Ok(handshake) => {
                guard.defuse();
                let session = DeviceSession::start(handshake);
                self.set_state(ConnectionState::Ready);
                Ok(session)
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", mac, e);
                guard.release();
                self.set_state(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        mac: MacAddr,
        guard: &mut ReleaseGuard,
    ) -> Result<Handshake, ConnectError> {
        self.set_state(ConnectionState::Connecting);
        let descriptor = self
            .backend
            .find_bonded(mac)
            .await?
            .ok_or(ConnectError::DeviceNotFound { mac })?;
        info!("Connecting to {} ({})", descriptor.name, descriptor.mac_address);

        let gatt = self.backend.connect_gatt(&descriptor).await?;
        guard.gatt = Some(gatt.clone());

        self.set_state(ConnectionState::AwaitingReady);
        tokio::time::timeout(self.config.ready_timeout(), gatt.wait_until_ready())
            .await
            .map_err(|_| ConnectError::ReadinessTimeout)??;

        let service = gatt
            .service_uuid()
            .await?
            .ok_or(ConnectError::ServiceNotFound)?;
        debug!("Using service {}", service);

        let opened = gatt
            .open_link(service)
            .await
            .map_err(|source| ConnectError::TransportConstruction { source })?;
        let (queue, mut notifications) =
            CommandQueue::start(opened, self.config.notification_buffer);
        guard.queue = Some(queue.clone());

        self.set_state(ConnectionState::RequestingInitialState);
        let update = self.request_initial_state(&queue, &mut notifications).await?;
        info!("Received initial state ({:?} layout)", update.family);

        Ok(Handshake {
            descriptor,
            gatt,
            queue,
            notifications,
            update,
        })
    }

    async fn request_initial_state(
        &self,
        queue: &CommandQueue,
        notifications: &mut Notifications,
    ) -> Result<StateUpdate, ConnectError> {
        let attempts = self.config.state_request_attempts.max(1);
        for attempt in 1..=attempts {
            debug!("Requesting state, attempt {}/{}", attempt, attempts);
            queue
                .write(encode_request_state())
                .await
                .map_err(|_| ConnectError::Disconnected)?;

            match tokio::time::timeout(
                self.config.state_request_timeout(),
                next_state_update(notifications),
            )
            .await
            {
                Ok(Some(update)) => return Ok(update),
                Ok(None) => return Err(ConnectError::Disconnected),
                Err(_) => warn!("State request {} timed out", attempt),
            }

            if attempt < attempts && !self.config.state_request_retry_delay().is_zero() {
                tokio::time::sleep(self.config.state_request_retry_delay()).await;
            }
        }
        Err(ConnectError::StateRequestTimeout { attempts })
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        info!("Connection state: {:?}", state);
    }
}

async fn next_state_update(notifications: &mut Notifications) -> Option<StateUpdate> {
    while let Some(packet) = notifications.recv().await {
        match packet {
            Packet::StateUpdate(update) => return Some(update),
            other => debug!("Ignoring {} while waiting for state", other.name()),
        }
    }
    None
}
