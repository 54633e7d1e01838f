//! BlueZ backend, talking to bluetoothd over D-Bus.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Address, Device, DeviceEvent, DeviceProperty, Session};
use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{
    is_soundcore_service, BleBackend, ConnectionDescriptor, GattHandle, GattLink, MacAddr,
    OpenedLink, NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID,
};
use crate::error::BackendError;

const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);
const INBOUND_DEPTH: usize = 64;

pub struct BluezBackend {
    _session: Session,
    adapter: Adapter,
}

impl BluezBackend {
    pub async fn new() -> Result<Self, BackendError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        info!("Using Bluetooth adapter {}", adapter.name());
        Ok(Self {
            _session: session,
            adapter,
        })
    }
}

#[async_trait]
impl BleBackend for BluezBackend {
    async fn bonded_devices(&self) -> Result<Vec<ConnectionDescriptor>, BackendError> {
        let mut result = Vec::new();
        for addr in self.adapter.device_addresses().await? {
            let device = self.adapter.device(addr)?;
            if !device.is_paired().await? {
                continue;
            }
            let name = device.name().await?.unwrap_or_default();
            result.push(ConnectionDescriptor {
                name,
                mac_address: MacAddr(addr.0),
            });
        }
        Ok(result)
    }

    async fn connect_gatt(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn GattHandle>, BackendError> {
        let device = self
            .adapter
            .device(Address::new(descriptor.mac_address.0))?;
        if !device.is_connected().await? {
            info!("Opening BLE link to {}", descriptor.mac_address);
            device.connect().await?;
        }

        let (disconnected, _) = watch::channel(false);
        let disconnected = Arc::new(disconnected);
        let events = device.events().await?;
        let watcher = tokio::spawn(watch_connection(events, disconnected.clone()));

        Ok(Arc::new(BluezGatt {
            device,
            disconnected,
            tasks: Mutex::new(vec![watcher]),
        }))
    }
}

async fn watch_connection(
    events: impl Stream<Item = DeviceEvent>,
    disconnected: Arc<watch::Sender<bool>>,
) {
    pin_mut!(events);
    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            info!("Device reported disconnect");
            disconnected.send_replace(true);
            return;
        }
    }
    disconnected.send_replace(true);
}

struct BluezGatt {
    device: Device,
    disconnected: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BluezGatt {
    async fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, BackendError> {
        for s in self.device.services().await? {
            if s.uuid().await? != service {
                continue;
            }
            for c in s.characteristics().await? {
                if c.uuid().await? == characteristic {
                    return Ok(c);
                }
            }
        }
        Err(BackendError::CharacteristicNotFound(characteristic))
    }
}

#[async_trait]
impl GattHandle for BluezGatt {
    async fn wait_until_ready(&self) -> Result<(), BackendError> {
        while !self.device.is_services_resolved().await? {
            tokio::time::sleep(SERVICES_POLL_INTERVAL).await;
        }
        debug!("Services resolved");
        Ok(())
    }

    async fn service_uuid(&self) -> Result<Option<Uuid>, BackendError> {
        for service in self.device.services().await? {
            let uuid = service.uuid().await?;
            if is_soundcore_service(uuid) {
                return Ok(Some(uuid));
            }
        }
        Ok(None)
    }

    async fn open_link(&self, service: Uuid) -> Result<OpenedLink, BackendError> {
        let writer = self
            .characteristic(service, WRITE_CHARACTERISTIC_UUID)
            .await?;
        let notifier = self
            .characteristic(service, NOTIFY_CHARACTERISTIC_UUID)
            .await?;

        let stream = notifier.notify().await?;
        let (tx, rx) = mpsc::channel(INBOUND_DEPTH);
        let forwarder = tokio::spawn(async move {
            pin_mut!(stream);
            while let Some(value) = stream.next().await {
                if tx.send(value).await.is_err() {
                    break;
                }
            }
            debug!("Notification forwarder stopped");
        });

        Ok(OpenedLink {
            link: Arc::new(BluezLink {
                characteristic: writer,
                forwarder,
            }),
            inbound: rx,
        })
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected.subscribe()
    }

    fn disconnect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to disconnect {} from", self.device.address());
            return;
        };
        let device = self.device.clone();
        runtime.spawn(async move {
            if let Err(e) = device.disconnect().await {
                warn!("Disconnect failed: {}", e);
            }
        });
    }

    fn close(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

struct BluezLink {
    characteristic: Characteristic,
    forwarder: JoinHandle<()>,
}

#[async_trait]
impl GattLink for BluezLink {
    async fn write(&self, data: &[u8]) -> Result<(), BackendError> {
        self.characteristic.write(data).await?;
        Ok(())
    }

    fn close(&self) {
        self.forwarder.abort();
    }
}
