use serde::{Deserialize, Serialize};

use super::sound_modes::{
    AmbientSoundMode, CustomNoiseCanceling, NoiseCancelingMode, SoundModes, TransparencyMode,
};

/// Feature bitset reported for a device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFeatureFlags(u32);

impl DeviceFeatureFlags {
    pub const SOUND_MODES: Self = Self(1 << 0);
    pub const NOISE_CANCELING_MODE: Self = Self(1 << 1);
    pub const CUSTOM_NOISE_CANCELING: Self = Self(1 << 2);
    pub const TRANSPARENCY_MODES: Self = Self(1 << 3);
    pub const EQUALIZER: Self = Self(1 << 4);
    pub const TWO_CHANNEL_EQUALIZER: Self = Self(1 << 5);
    pub const HEAR_ID: Self = Self(1 << 6);
    pub const WEAR_DETECTION: Self = Self(1 << 7);

    const NAMES: [(Self, &'static str); 8] = [
        (Self::SOUND_MODES, "sound_modes"),
        (Self::NOISE_CANCELING_MODE, "noise_canceling_mode"),
        (Self::CUSTOM_NOISE_CANCELING, "custom_noise_canceling"),
        (Self::TRANSPARENCY_MODES, "transparency_modes"),
        (Self::EQUALIZER, "equalizer"),
        (Self::TWO_CHANNEL_EQUALIZER, "two_channel_equalizer"),
        (Self::HEAR_ID, "hear_id"),
        (Self::WEAR_DETECTION, "wear_detection"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self((1 << 8) - 1)
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for DeviceFeatureFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Protocol family, selected by the layout of the full state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    A3027,
    A3028,
}

impl DeviceFamily {
    pub fn feature_flags(&self) -> DeviceFeatureFlags {
        match self {
            Self::A3028 => {
                DeviceFeatureFlags::SOUND_MODES
                    | DeviceFeatureFlags::NOISE_CANCELING_MODE
                    | DeviceFeatureFlags::EQUALIZER
            }
            Self::A3027 => {
                DeviceFeatureFlags::SOUND_MODES
                    | DeviceFeatureFlags::NOISE_CANCELING_MODE
                    | DeviceFeatureFlags::EQUALIZER
                    | DeviceFeatureFlags::WEAR_DETECTION
            }
        }
    }

    pub fn profile(&self) -> DeviceCapabilityProfile {
        let name = match self {
            Self::A3027 => "Soundcore Life Q35",
            Self::A3028 => "Soundcore Life Q30",
        };
        DeviceCapabilityProfile {
            name,
            ..DeviceCapabilityProfile::from_flags(self.feature_flags())
        }
    }
}

/// What a connected device accepts. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilityProfile {
    pub name: &'static str,
    pub flags: DeviceFeatureFlags,
    pub equalizer_channels: usize,
    pub equalizer_bands: usize,
}

impl DeviceCapabilityProfile {
    pub fn from_flags(flags: DeviceFeatureFlags) -> Self {
        let equalizer_channels = if flags.contains(DeviceFeatureFlags::TWO_CHANNEL_EQUALIZER) {
            2
        } else {
            1
        };
        Self {
            name: "Soundcore device",
            flags,
            equalizer_channels,
            equalizer_bands: 8,
        }
    }

    pub fn has(&self, flag: DeviceFeatureFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether switching the ambient sound mode from `current` to `candidate` is allowed.
    pub fn supports_ambient(&self, candidate: AmbientSoundMode, current: AmbientSoundMode) -> bool {
        if candidate == current {
            return true;
        }
        match candidate {
            AmbientSoundMode::NoiseCanceling => self.has(DeviceFeatureFlags::NOISE_CANCELING_MODE),
            AmbientSoundMode::Transparency | AmbientSoundMode::Normal => {
                self.has(DeviceFeatureFlags::SOUND_MODES)
            }
        }
    }

    pub fn supports_noise_canceling(
        &self,
        candidate: NoiseCancelingMode,
        current: NoiseCancelingMode,
    ) -> bool {
        if candidate == current {
            return true;
        }
        let base = self.has(DeviceFeatureFlags::NOISE_CANCELING_MODE);
        match candidate {
            NoiseCancelingMode::Custom => {
                base && self.has(DeviceFeatureFlags::CUSTOM_NOISE_CANCELING)
            }
            _ => base,
        }
    }

    pub fn supports_transparency(
        &self,
        candidate: TransparencyMode,
        current: TransparencyMode,
    ) -> bool {
        candidate == current || self.has(DeviceFeatureFlags::TRANSPARENCY_MODES)
    }

    pub fn supports_custom_noise_canceling(
        &self,
        candidate: CustomNoiseCanceling,
        current: CustomNoiseCanceling,
    ) -> bool {
        candidate == current || self.has(DeviceFeatureFlags::CUSTOM_NOISE_CANCELING)
    }

    /// Per-field support of `candidate` given the `current` modes.
    pub fn supports(&self, candidate: &SoundModes, current: &SoundModes) -> SoundModeSupport {
        SoundModeSupport {
            ambient_sound_mode: self
                .supports_ambient(candidate.ambient_sound_mode, current.ambient_sound_mode),
            noise_canceling_mode: self.supports_noise_canceling(
                candidate.noise_canceling_mode,
                current.noise_canceling_mode,
            ),
            transparency_mode: self
                .supports_transparency(candidate.transparency_mode, current.transparency_mode),
            custom_noise_canceling: self.supports_custom_noise_canceling(
                candidate.custom_noise_canceling,
                current.custom_noise_canceling,
            ),
        }
    }
}

/// Result of [`DeviceCapabilityProfile::supports`], one flag per field group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundModeSupport {
    pub ambient_sound_mode: bool,
    pub noise_canceling_mode: bool,
    pub transparency_mode: bool,
    pub custom_noise_canceling: bool,
}

impl SoundModeSupport {
    pub fn all(&self) -> bool {
        self.ambient_sound_mode
            && self.noise_canceling_mode
            && self.transparency_mode
            && self.custom_noise_canceling
    }
}

/// Get a capability profile by Bluetooth device name.
pub fn profile_for_model(name: &str) -> Option<DeviceCapabilityProfile> {
    match name {
        "Soundcore Life Q30" | "Life Q30" => Some(DeviceFamily::A3028.profile()),
        "Soundcore Life Q35" | "Life Q35" => Some(DeviceFamily::A3027.profile()),
        _ => None,
    }
}
