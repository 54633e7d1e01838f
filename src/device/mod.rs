pub mod battery;
pub mod debounce;
pub mod equalizer;
pub mod filter;
pub mod info;
pub mod models;
pub mod session;
pub mod slot;
pub mod sound_modes;

use serde::Serialize;

use battery::Battery;
use equalizer::EqualizerConfiguration;
use info::{DualFirmwareVersion, HearIdInfo, SerialNumber};
use models::DeviceFeatureFlags;
use sound_modes::{AmbientSoundMode, NoiseCancelingMode, SoundModes};

/// Everything known about a connected device.
///
/// Full state updates from the device replace it wholesale. Partial
/// notifications and optimistic writes replace single fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceState {
    pub feature_flags: DeviceFeatureFlags,
    pub sound_modes: SoundModes,
    pub equalizer: EqualizerConfiguration,
    pub battery: Battery,
    pub firmware: DualFirmwareVersion,
    pub serial_number: Option<SerialNumber>,
    pub hear_id: Option<HearIdInfo>,
    pub wear_detection: Option<bool>,
    pub touch_controls: Option<bool>,
}

impl DeviceState {
    /// The fields that matter to consumers of [`session::StateChanges`].
    pub fn reduced(&self) -> ReducedState {
        ReducedState {
            ambient_sound_mode: self.sound_modes.ambient_sound_mode,
            noise_canceling_mode: self.sound_modes.noise_canceling_mode,
            equalizer: self.equalizer.clone(),
        }
    }
}

/// Projection of [`DeviceState`] used for change detection. Battery and
/// firmware updates do not change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedState {
    pub ambient_sound_mode: AmbientSoundMode,
    pub noise_canceling_mode: NoiseCancelingMode,
    pub equalizer: EqualizerConfiguration,
}
