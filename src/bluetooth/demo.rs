//! In-process fake headphones. Backs `--demo` and the connection tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use super::backend::{
    BleBackend, ConnectionDescriptor, GattHandle, GattLink, MacAddr, OpenedLink, SERVICE_UUID,
};
use crate::device::battery::{Battery, BatteryStatus};
use crate::device::equalizer::{EqualizerConfiguration, PresetEqualizerProfile};
use crate::device::info::{FirmwareVersion, HearIdInfo, SerialNumber};
use crate::device::models::DeviceFamily;
use crate::device::sound_modes::{
    AmbientSoundMode, CustomNoiseCanceling, NoiseCancelingMode, SoundModes, TransparencyMode,
};
use crate::device::DeviceState;
use crate::error::BackendError;
use crate::protocol::commands::*;
use crate::protocol::inbound::state_update_body;
use crate::protocol::packet::Direction;
use crate::protocol::SoundcorePacket;

const INBOUND_DEPTH: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the fake device behaves.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub name: String,
    pub mac_address: MacAddr,
    pub family: DeviceFamily,
    pub state: DeviceState,
    /// First state request (1-based) that gets an answer. `None` never answers.
    pub answer_from_request: Option<u32>,
    pub becomes_ready: bool,
    pub service_uuid: Option<Uuid>,
    pub reject_link: bool,
    pub bonded: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let family = DeviceFamily::A3028;
        let state = DeviceState {
            feature_flags: family.feature_flags(),
            sound_modes: SoundModes {
                ambient_sound_mode: AmbientSoundMode::Normal,
                noise_canceling_mode: NoiseCancelingMode::Indoor,
                transparency_mode: TransparencyMode::VocalMode,
                custom_noise_canceling: CustomNoiseCanceling::new(0),
            },
            equalizer: EqualizerConfiguration::from_preset(PresetEqualizerProfile::Acoustic, 1),
            battery: Battery::Single(BatteryStatus {
                level: 4,
                charging: false,
            }),
            firmware: crate::device::info::DualFirmwareVersion {
                left: Some(FirmwareVersion {
                    major: 2,
                    minor: 30,
                }),
                right: None,
            },
            serial_number: SerialNumber::from_ascii(b"3029086EC82F12AC"),
            hear_id: Some(HearIdInfo {
                gender: 0,
                age_range: 0,
                enabled: false,
                left: vec![0; 8],
                right: vec![0; 8],
                time: 0,
            }),
            wear_detection: None,
            touch_controls: None,
        };
        Self {
            name: "Soundcore Life Q30".to_string(),
            mac_address: MacAddr([0xAC, 0x12, 0x2F, 0x00, 0x00, 0x01]),
            family,
            state,
            answer_from_request: Some(1),
            becomes_ready: true,
            service_uuid: Some(SERVICE_UUID),
            reject_link: false,
            bonded: true,
        }
    }
}

/// Calls into the fake GATT layer, for asserting cleanup.
#[derive(Debug, Default)]
pub struct DemoCounters {
    pub gatt_disconnects: AtomicU32,
    pub gatt_closes: AtomicU32,
    pub link_closes: AtomicU32,
    pub open_link_calls: AtomicU32,
    pub state_requests: AtomicU32,
}

impl DemoCounters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// The simulated headphones: answers requests and applies writes.
pub struct DemoDevice {
    family: DeviceFamily,
    answer_from_request: Option<u32>,
    state: Mutex<DeviceState>,
    writes: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    disconnected: watch::Sender<bool>,
    counters: Arc<DemoCounters>,
}

impl DemoDevice {
    fn new(config: &DemoConfig, counters: Arc<DemoCounters>) -> Self {
        let (disconnected, _) = watch::channel(false);
        Self {
            family: config.family,
            answer_from_request: config.answer_from_request,
            state: Mutex::new(config.state.clone()),
            writes: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            disconnected,
            counters,
        }
    }

    /// The full state update frame the device currently answers with.
    pub fn state_frame(&self) -> Vec<u8> {
        let state = lock(&self.state).clone();
        SoundcorePacket::inbound(CMD_STATE_UPDATE, state_update_body(self.family, &state))
            .to_bytes()
    }

    /// Push raw notification bytes to the host. Returns false when no link is open.
    pub fn notify(&self, bytes: Vec<u8>) -> bool {
        match lock(&self.inbound).as_ref() {
            Some(tx) => tx.try_send(bytes).is_ok(),
            None => false,
        }
    }

    /// End the notification stream without a disconnect.
    pub fn end_notifications(&self) {
        lock(&self.inbound).take();
    }

    /// Simulate the device going out of range.
    pub fn power_off(&self) {
        info!("Demo device powering off");
        self.end_notifications();
        self.disconnected.send_replace(true);
    }

    /// Every raw write received, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    /// The sound modes carried by every set-sound-mode write, in order.
    pub fn sound_mode_writes(&self) -> Vec<SoundModes> {
        self.writes_for(CMD_SET_SOUND_MODE)
            .iter()
            .filter_map(|body| {
                let bytes: [u8; 4] = body.as_slice().try_into().ok()?;
                Some(SoundModes::from_bytes_lenient(bytes))
            })
            .collect()
    }

    /// Bodies of every write with `command`, in order.
    pub fn writes_for(&self, command: CommandId) -> Vec<Vec<u8>> {
        lock(&self.writes)
            .iter()
            .filter_map(|w| SoundcorePacket::from_bytes(w).ok())
            .filter(|p| p.command == command)
            .map(|p| p.body)
            .collect()
    }

    pub fn current_state(&self) -> DeviceState {
        lock(&self.state).clone()
    }

    fn handle_write(&self, data: &[u8]) {
        lock(&self.writes).push(data.to_vec());

        let packet = match SoundcorePacket::from_bytes(data) {
            Ok(p) if p.direction == Direction::Outbound => p,
            _ => {
                debug!("Demo device ignoring {} byte write", data.len());
                return;
            }
        };

        match packet.command {
            CMD_REQUEST_STATE => {
                let count = self.counters.state_requests.fetch_add(1, Ordering::SeqCst) + 1;
                match self.answer_from_request {
                    Some(first) if count >= first => {
                        self.notify(self.state_frame());
                    }
                    _ => debug!("Demo device ignoring state request #{}", count),
                }
            }
            CMD_SET_SOUND_MODE => {
                let Ok(bytes) = <[u8; 4]>::try_from(packet.body.as_slice()) else {
                    return;
                };
                let modes = SoundModes::from_bytes_lenient(bytes);
                lock(&self.state).sound_modes = modes;
                self.notify(SoundcorePacket::inbound(CMD_SET_SOUND_MODE, Vec::new()).to_bytes());
                self.notify(
                    SoundcorePacket::inbound(CMD_SOUND_MODE_UPDATE, modes.bytes().to_vec())
                        .to_bytes(),
                );
            }
            CMD_SET_EQUALIZER => {
                let channels = (packet.body.len().saturating_sub(2)) / 8;
                if let Some(config) = EqualizerConfiguration::from_bytes(&packet.body, channels, 8)
                {
                    lock(&self.state).equalizer = config;
                }
                self.notify(SoundcorePacket::inbound(CMD_SET_EQUALIZER, Vec::new()).to_bytes());
            }
            _ => {}
        }
    }
}

/// Fake backend with exactly one bonded device.
pub struct DemoBackend {
    config: DemoConfig,
    device: Arc<DemoDevice>,
    counters: Arc<DemoCounters>,
}

impl DemoBackend {
    pub fn new(config: DemoConfig) -> Self {
        let counters = Arc::new(DemoCounters::default());
        let device = Arc::new(DemoDevice::new(&config, counters.clone()));
        Self {
            config,
            device,
            counters,
        }
    }

    pub fn device(&self) -> Arc<DemoDevice> {
        self.device.clone()
    }

    pub fn counters(&self) -> Arc<DemoCounters> {
        self.counters.clone()
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            name: self.config.name.clone(),
            mac_address: self.config.mac_address,
        }
    }
}

#[async_trait]
impl BleBackend for DemoBackend {
    async fn bonded_devices(&self) -> Result<Vec<ConnectionDescriptor>, BackendError> {
        if self.config.bonded {
            Ok(vec![self.descriptor()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn connect_gatt(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn GattHandle>, BackendError> {
        info!("Demo GATT connect to {}", descriptor.mac_address);
        self.device.disconnected.send_replace(false);
        Ok(Arc::new(DemoGatt {
            device: self.device.clone(),
            counters: self.counters.clone(),
            becomes_ready: self.config.becomes_ready,
            service_uuid: self.config.service_uuid,
            reject_link: self.config.reject_link,
        }))
    }
}

struct DemoGatt {
    device: Arc<DemoDevice>,
    counters: Arc<DemoCounters>,
    becomes_ready: bool,
    service_uuid: Option<Uuid>,
    reject_link: bool,
}

#[async_trait]
impl GattHandle for DemoGatt {
    async fn wait_until_ready(&self) -> Result<(), BackendError> {
        if !self.becomes_ready {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn service_uuid(&self) -> Result<Option<Uuid>, BackendError> {
        Ok(self.service_uuid)
    }

    async fn open_link(&self, service: Uuid) -> Result<OpenedLink, BackendError> {
        self.counters.open_link_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_link {
            return Err(BackendError::Other(format!(
                "demo device rejected link on service {}",
                service
            )));
        }
        let (tx, rx) = mpsc::channel(INBOUND_DEPTH);
        *lock(&self.device.inbound) = Some(tx);
        Ok(OpenedLink {
            link: Arc::new(DemoLink {
                device: self.device.clone(),
                counters: self.counters.clone(),
            }),
            inbound: rx,
        })
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.device.disconnected.subscribe()
    }

    fn disconnect(&self) {
        self.counters.gatt_disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.counters.gatt_closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct DemoLink {
    device: Arc<DemoDevice>,
    counters: Arc<DemoCounters>,
}

#[async_trait]
impl GattLink for DemoLink {
    async fn write(&self, data: &[u8]) -> Result<(), BackendError> {
        self.device.handle_write(data);
        Ok(())
    }

    fn close(&self) {
        self.counters.link_closes.fetch_add(1, Ordering::SeqCst);
        self.device.end_notifications();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Packet};

    #[test]
    fn test_state_frame_decodes_to_config_state() {
        let backend = DemoBackend::new(DemoConfig::default());
        let Packet::StateUpdate(update) = decode(&backend.device().state_frame()).unwrap() else {
            panic!("expected state update");
        };
        assert_eq!(update.family, DeviceFamily::A3028);
        assert_eq!(update.state.sound_modes, DemoConfig::default().state.sound_modes);
        assert_eq!(update.state.equalizer, DemoConfig::default().state.equalizer);
    }

    #[tokio::test]
    async fn test_unbonded_device_not_found() {
        let backend = DemoBackend::new(DemoConfig {
            bonded: false,
            ..Default::default()
        });
        let mac = backend.descriptor().mac_address;
        assert!(backend.find_bonded(mac).await.unwrap().is_none());
    }
}
