use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::debounce::EqualizerDebouncer;
use super::equalizer::EqualizerConfiguration;
use super::filter::filter_sound_modes;
use super::models::{DeviceCapabilityProfile, DeviceFeatureFlags};
use super::sound_modes::{AmbientSoundMode, NoiseCancelingMode, SoundModes};
use super::{DeviceState, ReducedState};
use crate::bluetooth::backend::{ConnectionDescriptor, GattHandle};
use crate::bluetooth::transport::{CommandQueue, Notifications};
use crate::bluetooth::Handshake;
use crate::config::presets::QuickPreset;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::outbound::{encode_set_equalizer, encode_set_sound_modes};
use crate::protocol::Packet;

/// A live connection to one device.
///
/// Cloning gives another handle to the same session. The connection is
/// released by [`DeviceSession::destroy`], when the device disconnects, or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    descriptor: ConnectionDescriptor,
    profile: DeviceCapabilityProfile,
    state: Arc<watch::Sender<DeviceState>>,
    alive: watch::Sender<bool>,
    queue: Arc<CommandQueue>,
    gatt: Arc<dyn GattHandle>,
    destroyed: AtomicBool,
    request_lock: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionInner {
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing session for {}", self.descriptor.mac_address);
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        self.alive.send_replace(false);
        self.queue.close();
        self.gatt.disconnect();
        self.gatt.close();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl DeviceSession {
    pub(crate) fn start(handshake: Handshake) -> Self {
        let Handshake {
            descriptor,
            gatt,
            queue,
            notifications,
            update,
        } = handshake;

        let profile = DeviceCapabilityProfile {
            flags: update.state.feature_flags,
            ..update.family.profile()
        };
        let (state, _) = watch::channel(update.state);
        let state = Arc::new(state);
        let (alive, _) = watch::channel(true);
        let disconnected = gatt.disconnected();

        let listener = tokio::spawn(listen(state.clone(), notifications));
        let inner = Arc::new(SessionInner {
            descriptor,
            profile,
            state,
            alive,
            queue,
            gatt,
            destroyed: AtomicBool::new(false),
            request_lock: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
        });
        let watcher = tokio::spawn(watch_disconnect(Arc::downgrade(&inner), disconnected));
        inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([listener, watcher]);

        info!(
            "Session ready for {} ({})",
            inner.descriptor.name, inner.profile.name
        );
        Self { inner }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.inner.descriptor
    }

    pub fn profile(&self) -> &DeviceCapabilityProfile {
        &self.inner.profile
    }

    /// Snapshot of everything currently known, battery and firmware included.
    pub fn current_state(&self) -> DeviceState {
        self.inner.state.borrow().clone()
    }

    /// Stream of states that differ from the previous one in ambient mode,
    /// noise canceling mode or equalizer. The first item is the current state.
    pub fn state_changes(&self) -> StateChanges {
        StateChanges {
            rx: self.inner.state.subscribe(),
            alive: self.inner.alive.subscribe(),
            last: None,
        }
    }

    pub async fn request_sound_mode_change(
        &self,
        ambient_sound_mode: AmbientSoundMode,
        noise_canceling_mode: NoiseCancelingMode,
    ) -> Result<SoundModes, SessionError> {
        self.update_sound_modes(|current| {
            current
                .with_ambient(ambient_sound_mode)
                .with_noise_canceling(noise_canceling_mode)
        })
        .await
    }

    /// Send the supported part of `desired` and show it right away.
    ///
    /// Returns the modes that were applied after unsupported fields were
    /// replaced by their current values.
    pub async fn request_sound_modes(&self, desired: SoundModes) -> Result<SoundModes, SessionError> {
        self.update_sound_modes(|_| desired).await
    }

    /// Like [`Self::request_sound_modes`], with `desired` built from the
    /// current modes once earlier requests have finished.
    async fn update_sound_modes(
        &self,
        desired: impl FnOnce(SoundModes) -> SoundModes,
    ) -> Result<SoundModes, SessionError> {
        self.ensure_alive()?;
        let _guard = self.inner.request_lock.lock().await;

        let current = self.inner.state.borrow().sound_modes;
        let desired = desired(current);
        let target = filter_sound_modes(&self.inner.profile, &current, &desired);
        if target != desired {
            debug!("Filtered sound modes {} to {}", desired, target);
        }

        let plan = sound_mode_write_plan(&current, &target);
        if plan.is_empty() {
            debug!("Sound modes already {}", target);
            return Ok(target);
        }
        for modes in &plan {
            self.inner.queue.write(encode_set_sound_modes(modes)).await?;
        }
        self.inner.state.send_modify(|state| state.sound_modes = target);
        info!("Sound modes set to {} ({} write(s))", target, plan.len());
        Ok(target)
    }

    /// Send `config` unless it matches the current equalizer.
    ///
    /// Returns whether a command was written. Callers driving this from a
    /// slider should debounce first, see [`super::debounce::EqualizerDebouncer`].
    pub async fn request_equalizer_change(
        &self,
        config: EqualizerConfiguration,
    ) -> Result<bool, SessionError> {
        self.ensure_alive()?;
        if !self.inner.profile.has(DeviceFeatureFlags::EQUALIZER) {
            return Err(SessionError::FeatureNotSupported("equalizer"));
        }
        let config = config.fit(
            self.inner.profile.equalizer_channels,
            self.inner.profile.equalizer_bands,
        );
        let _guard = self.inner.request_lock.lock().await;

        let unchanged = self.inner.state.borrow().equalizer == config;
        if unchanged {
            debug!("Equalizer unchanged, nothing to send");
            return Ok(false);
        }
        self.inner.queue.write(encode_set_equalizer(&config)).await?;
        info!(
            "Equalizer set to {}",
            config.preset_profile().map_or("custom", |p| p.as_str())
        );
        self.inner.state.send_modify(|state| state.equalizer = config);
        Ok(true)
    }

    /// Equalizer input that waits for the configured quiet period before sending.
    pub fn equalizer_debouncer(&self, config: &SessionConfig) -> EqualizerDebouncer {
        EqualizerDebouncer::new(self.clone(), config.equalizer_debounce())
    }

    /// Apply the set fields of `preset` through the normal request path.
    pub async fn apply_quick_preset(&self, preset: &QuickPreset) -> Result<(), SessionError> {
        info!("Applying quick preset '{}'", preset.name);
        self.update_sound_modes(|current| preset.apply_to(current))
            .await?;
        if let Some(equalizer) = &preset.equalizer {
            if self.inner.profile.has(DeviceFeatureFlags::EQUALIZER) {
                self.request_equalizer_change(equalizer.clone()).await?;
            } else {
                debug!("Skipping preset equalizer, not supported");
            }
        }
        Ok(())
    }

    /// Wait until every request made so far has been written to the device.
    pub async fn flush(&self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.inner.queue.flush().await
    }

    /// Release the connection. Safe to call any number of times.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same session.
    pub fn same_session(&self, other: &DeviceSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.is_destroyed() {
            Err(SessionError::Destroyed)
        } else {
            Ok(())
        }
    }
}

/// See [`DeviceSession::state_changes`].
pub struct StateChanges {
    rx: watch::Receiver<DeviceState>,
    alive: watch::Receiver<bool>,
    last: Option<ReducedState>,
}

impl StateChanges {
    /// Next meaningful state, or `None` once the session is gone.
    pub async fn next(&mut self) -> Option<DeviceState> {
        loop {
            if self.last.is_some() {
                tokio::select! {
                    changed = self.rx.changed() => changed.ok()?,
                    _ = self.alive.wait_for(|alive| !*alive) => return None,
                }
            } else if !*self.alive.borrow() {
                return None;
            }

            let state = self.rx.borrow_and_update().clone();
            let reduced = state.reduced();
            if self.last.as_ref() != Some(&reduced) {
                self.last = Some(reduced);
                return Some(state);
            }
        }
    }
}

/// The set-sound-mode writes that move the device from `current` to `target`.
///
/// Firmware ignores a noise canceling mode change unless the device is in
/// noise canceling, so that case switches to it first.
pub(crate) fn sound_mode_write_plan(current: &SoundModes, target: &SoundModes) -> Vec<SoundModes> {
    if current == target {
        return Vec::new();
    }
    let needs_switch = current.ambient_sound_mode != AmbientSoundMode::NoiseCanceling
        && current.noise_canceling_mode != target.noise_canceling_mode;
    if !needs_switch {
        return vec![*target];
    }

    let mut plan = vec![
        current.with_ambient(AmbientSoundMode::NoiseCanceling),
        target.with_ambient(AmbientSoundMode::NoiseCanceling),
    ];
    if target.ambient_sound_mode != AmbientSoundMode::NoiseCanceling {
        plan.push(*target);
    }
    plan
}

async fn listen(state: Arc<watch::Sender<DeviceState>>, mut notifications: Notifications) {
    while let Some(packet) = notifications.recv().await {
        apply_packet(&state, packet);
    }
    info!("Notification stream ended");
}

fn apply_packet(state: &watch::Sender<DeviceState>, packet: Packet) {
    match packet {
        Packet::StateUpdate(update) => {
            state.send_replace(update.state);
        }
        Packet::AmbientSoundModeUpdate {
            ambient_sound_mode,
            noise_canceling_mode,
        } => state.send_modify(|state| {
            state.sound_modes.ambient_sound_mode = ambient_sound_mode;
            state.sound_modes.noise_canceling_mode = noise_canceling_mode;
        }),
        Packet::SetAmbientModeAck | Packet::SetEqualizerAck => {
            debug!("Device acknowledged {}", packet.name());
        }
        Packet::BatteryLevelUpdate(levels) => {
            state.send_modify(|state| state.battery = state.battery.with_levels(&levels))
        }
        Packet::FirmwareVersionUpdate {
            firmware,
            serial_number,
        } => state.send_modify(|state| {
            state.firmware = firmware;
            state.serial_number = Some(serial_number);
        }),
        Packet::Unknown { command, body } => {
            debug!(
                "Unhandled command {:02X}{:02X} ({} byte body)",
                command[0],
                command[1],
                body.len()
            );
        }
    }
}

async fn watch_disconnect(session: Weak<SessionInner>, mut disconnected: watch::Receiver<bool>) {
    if disconnected.wait_for(|gone| *gone).await.is_err() {
        return;
    }
    if let Some(inner) = session.upgrade() {
        info!("Device {} disconnected", inner.descriptor.mac_address);
        inner.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bluetooth::demo::{DemoBackend, DemoConfig, DemoCounters, DemoDevice};
    use crate::bluetooth::ConnectionManager;
    use crate::config::SessionConfig;
    use crate::device::equalizer::{PresetEqualizerProfile, VolumeAdjustments};
    use crate::device::sound_modes::{CustomNoiseCanceling, TransparencyMode};
    use crate::protocol::commands::*;
    use crate::protocol::SoundcorePacket;

    async fn connect(config: DemoConfig) -> (Arc<DemoBackend>, DeviceSession) {
        let backend = Arc::new(DemoBackend::new(config));
        let manager = ConnectionManager::new(backend.clone(), SessionConfig::default());
        let session = manager
            .connect(backend.descriptor().mac_address)
            .await
            .unwrap();
        (backend, session)
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_sound_mode_writes(device: &DemoDevice, count: usize) -> Vec<SoundModes> {
        loop {
            let writes = device.sound_mode_writes();
            if writes.len() >= count {
                return writes;
            }
            tokio::task::yield_now().await;
        }
    }

    fn modes(
        ambient: AmbientSoundMode,
        nc: NoiseCancelingMode,
        transparency: TransparencyMode,
    ) -> SoundModes {
        SoundModes {
            ambient_sound_mode: ambient,
            noise_canceling_mode: nc,
            transparency_mode: transparency,
            custom_noise_canceling: CustomNoiseCanceling::new(0),
        }
    }

    #[test]
    fn test_write_plan_unchanged_is_empty() {
        let current = modes(
            AmbientSoundMode::Normal,
            NoiseCancelingMode::Indoor,
            TransparencyMode::VocalMode,
        );
        assert!(sound_mode_write_plan(&current, &current).is_empty());
    }

    #[test]
    fn test_write_plan_single_write_from_noise_canceling() {
        let current = modes(
            AmbientSoundMode::NoiseCanceling,
            NoiseCancelingMode::Indoor,
            TransparencyMode::VocalMode,
        );
        let target = current
            .with_ambient(AmbientSoundMode::Transparency)
            .with_noise_canceling(NoiseCancelingMode::Outdoor);
        assert_eq!(sound_mode_write_plan(&current, &target), vec![target]);
    }

    #[test]
    fn test_write_plan_switches_to_noise_canceling_first() {
        let current = modes(
            AmbientSoundMode::Normal,
            NoiseCancelingMode::Indoor,
            TransparencyMode::VocalMode,
        );
        let target = current
            .with_ambient(AmbientSoundMode::Transparency)
            .with_noise_canceling(NoiseCancelingMode::Outdoor);

        let plan = sound_mode_write_plan(&current, &target);
        assert_eq!(
            plan,
            vec![
                current.with_ambient(AmbientSoundMode::NoiseCanceling),
                target.with_ambient(AmbientSoundMode::NoiseCanceling),
                target,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_canceling_selected_before_ambient_switch() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let device = backend.device();
        let current = session.current_state().sound_modes;

        let applied = session
            .request_sound_mode_change(
                AmbientSoundMode::NoiseCanceling,
                NoiseCancelingMode::Transport,
            )
            .await
            .unwrap();

        // Shown before the device answers.
        assert_eq!(session.current_state().sound_modes, applied);

        let writes = wait_for_sound_mode_writes(&device, 2).await;
        assert_eq!(
            writes,
            vec![
                current.with_ambient(AmbientSoundMode::NoiseCanceling),
                applied,
            ]
        );
        assert_eq!(applied.noise_canceling_mode, NoiseCancelingMode::Transport);

        settle().await;
        assert_eq!(device.sound_mode_writes().len(), 2);
        assert_eq!(
            session.current_state().sound_modes.noise_canceling_mode,
            NoiseCancelingMode::Transport
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_fields_are_dropped_before_writing() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let current = session.current_state().sound_modes;

        let desired = SoundModes {
            ambient_sound_mode: AmbientSoundMode::Transparency,
            noise_canceling_mode: NoiseCancelingMode::Custom,
            transparency_mode: TransparencyMode::FullyTransparent,
            custom_noise_canceling: CustomNoiseCanceling::new(6),
        };
        let applied = session.request_sound_modes(desired).await.unwrap();

        assert_eq!(applied, current.with_ambient(AmbientSoundMode::Transparency));
        assert_eq!(session.current_state().sound_modes, applied);
        let writes = wait_for_sound_mode_writes(&backend.device(), 1).await;
        assert_eq!(writes, vec![applied]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_request_writes_nothing() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let current = session.current_state().sound_modes;

        session
            .request_sound_mode_change(current.ambient_sound_mode, current.noise_canceling_mode)
            .await
            .unwrap();

        settle().await;
        assert!(backend.device().sound_mode_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_equalizer_deduplicated_by_content() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let device = backend.device();

        let same = session.current_state().equalizer;
        assert!(!session.request_equalizer_change(same).await.unwrap());

        let podcast = EqualizerConfiguration::from_preset(PresetEqualizerProfile::Podcast, 1);
        assert!(session.request_equalizer_change(podcast.clone()).await.unwrap());
        assert_eq!(session.current_state().equalizer, podcast);

        // Equal content, separate value.
        let again = EqualizerConfiguration::from_preset(PresetEqualizerProfile::Podcast, 1);
        assert!(!session.request_equalizer_change(again).await.unwrap());

        settle().await;
        assert_eq!(device.writes_for(CMD_SET_EQUALIZER).len(), 1);
        assert_eq!(device.current_state().equalizer, podcast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_equalizer_reaches_device() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let bands = VolumeAdjustments::new([-60, -30, 0, 10, 20, 30, 60, 120]);
        let config = EqualizerConfiguration::custom(vec![bands]);

        assert!(session.request_equalizer_change(config.clone()).await.unwrap());
        settle().await;
        assert_eq!(backend.device().current_state().equalizer, config);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equalizer_fitted_to_device_band_count() {
        let (backend, session) = connect(DemoConfig::default()).await;
        assert_eq!(session.profile().equalizer_bands, 8);
        let ten = VolumeAdjustments::new([-60, -30, 0, 10, 20, 30, 60, 120, 40, 40]);
        assert_eq!(ten.len(), 10);

        assert!(session
            .request_equalizer_change(EqualizerConfiguration::custom(vec![ten]))
            .await
            .unwrap());
        session.flush().await.unwrap();

        let writes = backend.device().writes_for(CMD_SET_EQUALIZER);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 2 + 8);
        let local = session.current_state().equalizer;
        assert_eq!(
            local.channel(0).unwrap().values(),
            &[-60, -30, 0, 10, 20, 30, 60, 120]
        );
        assert_eq!(local.channels().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_skip_battery_only_updates() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let device = backend.device();
        let mut changes = session.state_changes();

        let first = changes.next().await.unwrap();
        assert_eq!(first, session.current_state());

        device.notify(SoundcorePacket::inbound(CMD_BATTERY_LEVEL_UPDATE, vec![2]).to_bytes());
        let nothing = tokio::time::timeout(Duration::from_millis(100), changes.next()).await;
        assert!(nothing.is_err());
        assert_eq!(session.current_state().battery.to_string(), "2/5");

        device.notify(
            SoundcorePacket::inbound(CMD_SOUND_MODE_UPDATE, vec![0x01, 0x00, 0x01, 0x00])
                .to_bytes(),
        );
        let next = changes.next().await.unwrap();
        assert_eq!(next.sound_modes.ambient_sound_mode, AmbientSoundMode::Transparency);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_update_merges_ambient_and_noise_canceling_only() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let before = session.current_state();

        // Transparency byte says FullyTransparent, it must not be applied.
        backend.device().notify(
            SoundcorePacket::inbound(CMD_SOUND_MODE_UPDATE, vec![0x00, 0x00, 0x00, 0x05])
                .to_bytes(),
        );
        settle().await;

        let after = session.current_state();
        assert_eq!(after.sound_modes.ambient_sound_mode, AmbientSoundMode::NoiseCanceling);
        assert_eq!(after.sound_modes.noise_canceling_mode, NoiseCancelingMode::Transport);
        assert_eq!(after.sound_modes.transparency_mode, before.sound_modes.transparency_mode);
        assert_eq!(
            after.sound_modes.custom_noise_canceling,
            before.sound_modes.custom_noise_canceling
        );
        assert_eq!(after.equalizer, before.equalizer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_update_replaces_state() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let device = backend.device();

        device.notify(
            SoundcorePacket::inbound(CMD_SOUND_MODE_UPDATE, vec![0x00, 0x01]).to_bytes(),
        );
        settle().await;
        assert_eq!(
            session.current_state().sound_modes.ambient_sound_mode,
            AmbientSoundMode::NoiseCanceling
        );

        let frame = device.state_frame();
        let Packet::StateUpdate(update) = crate::protocol::decode(&frame).unwrap() else {
            panic!("expected state update");
        };
        device.notify(frame);
        settle().await;
        assert_eq!(session.current_state(), update.state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let other = session.clone();

        session.destroy();
        other.destroy();
        drop(session);
        drop(other);

        let counters = backend.counters();
        assert_eq!(DemoCounters::get(&counters.gatt_disconnects), 1);
        assert_eq!(DemoCounters::get(&counters.gatt_closes), 1);
        assert_eq!(DemoCounters::get(&counters.link_closes), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_fail_after_destroy() {
        let (_backend, session) = connect(DemoConfig::default()).await;
        let mut changes = session.state_changes();
        changes.next().await.unwrap();

        session.destroy();

        assert!(matches!(
            session
                .request_sound_mode_change(
                    AmbientSoundMode::Transparency,
                    NoiseCancelingMode::Indoor
                )
                .await,
            Err(SessionError::Destroyed)
        ));
        assert!(changes.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_disconnect_destroys_session() {
        let (backend, session) = connect(DemoConfig::default()).await;

        backend.device().power_off();
        settle().await;

        assert!(session.is_destroyed());
        assert_eq!(DemoCounters::get(&backend.counters().gatt_closes), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_preset_goes_through_filter() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let preset = QuickPreset {
            name: "focus".into(),
            ambient_sound_mode: Some(AmbientSoundMode::NoiseCanceling),
            transparency_mode: Some(TransparencyMode::FullyTransparent),
            equalizer: Some(EqualizerConfiguration::from_preset(
                PresetEqualizerProfile::Classical,
                1,
            )),
            ..Default::default()
        };

        session.apply_quick_preset(&preset).await.unwrap();

        let state = session.current_state();
        assert_eq!(state.sound_modes.ambient_sound_mode, AmbientSoundMode::NoiseCanceling);
        // No transparency mode support on this model.
        assert_eq!(state.sound_modes.transparency_mode, TransparencyMode::VocalMode);
        assert_eq!(
            state.equalizer.preset_profile(),
            Some(PresetEqualizerProfile::Classical)
        );
        settle().await;
        assert_eq!(backend.device().writes_for(CMD_SET_EQUALIZER).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_preset_reads_modes_after_pending_requests() {
        let (backend, session) = connect(DemoConfig::default()).await;
        let preset = QuickPreset {
            name: "outside".into(),
            ambient_sound_mode: Some(AmbientSoundMode::Transparency),
            ..Default::default()
        };

        let guard = session.inner.request_lock.lock().await;
        let task = tokio::spawn({
            let session = session.clone();
            async move { session.apply_quick_preset(&preset).await }
        });
        settle().await;

        // The device switches noise canceling while the preset waits its turn.
        backend.device().notify(
            SoundcorePacket::inbound(CMD_SOUND_MODE_UPDATE, vec![0x00, 0x00]).to_bytes(),
        );
        settle().await;
        drop(guard);
        task.await.unwrap().unwrap();

        let modes = session.current_state().sound_modes;
        assert_eq!(modes.ambient_sound_mode, AmbientSoundMode::Transparency);
        assert_eq!(modes.noise_canceling_mode, NoiseCancelingMode::Transport);
    }
}
