use serde::{Deserialize, Serialize};

/// Top-level ambient sound mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientSoundMode {
    #[default]
    NoiseCanceling = 0,
    Transparency = 1,
    Normal = 2,
}

impl AmbientSoundMode {
    pub const ALL: [Self; 3] = [Self::NoiseCanceling, Self::Transparency, Self::Normal];

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::NoiseCanceling),
            1 => Some(Self::Transparency),
            2 => Some(Self::Normal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoiseCanceling => "noise_canceling",
            Self::Transparency => "transparency",
            Self::Normal => "normal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "noise_canceling" => Some(Self::NoiseCanceling),
            "transparency" => Some(Self::Transparency),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Noise canceling preset used while the ambient mode is NoiseCanceling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCancelingMode {
    #[default]
    Transport = 0,
    Outdoor = 1,
    Indoor = 2,
    Custom = 3,
}

impl NoiseCancelingMode {
    pub const ALL: [Self; 4] = [Self::Transport, Self::Outdoor, Self::Indoor, Self::Custom];

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Transport),
            1 => Some(Self::Outdoor),
            2 => Some(Self::Indoor),
            3 => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Outdoor => "outdoor",
            Self::Indoor => "indoor",
            Self::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transport" => Some(Self::Transport),
            "outdoor" => Some(Self::Outdoor),
            "indoor" => Some(Self::Indoor),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Transparency preset used while the ambient mode is Transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMode {
    #[default]
    FullyTransparent = 0,
    VocalMode = 1,
}

impl TransparencyMode {
    pub const ALL: [Self; 2] = [Self::FullyTransparent, Self::VocalMode];

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::FullyTransparent),
            1 => Some(Self::VocalMode),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyTransparent => "fully_transparent",
            Self::VocalMode => "vocal_mode",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fully_transparent" => Some(Self::FullyTransparent),
            "vocal_mode" => Some(Self::VocalMode),
            _ => None,
        }
    }
}

/// Intensity of the custom noise canceling mode, 0..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct CustomNoiseCanceling(u8);

impl CustomNoiseCanceling {
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for CustomNoiseCanceling {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<CustomNoiseCanceling> for u8 {
    fn from(value: CustomNoiseCanceling) -> Self {
        value.0
    }
}

/// All sound mode fields as the device reports and accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SoundModes {
    pub ambient_sound_mode: AmbientSoundMode,
    pub noise_canceling_mode: NoiseCancelingMode,
    pub transparency_mode: TransparencyMode,
    pub custom_noise_canceling: CustomNoiseCanceling,
}

impl SoundModes {
    pub const WIRE_LEN: usize = 4;

    /// Wire layout: [ambient, noise canceling, transparency, custom level].
    pub fn bytes(&self) -> [u8; 4] {
        [
            self.ambient_sound_mode as u8,
            self.noise_canceling_mode as u8,
            self.transparency_mode as u8,
            self.custom_noise_canceling.value(),
        ]
    }

    /// Lenient parse used for full state updates: unknown ids fall back to defaults.
    pub fn from_bytes_lenient(data: [u8; 4]) -> Self {
        Self {
            ambient_sound_mode: AmbientSoundMode::from_byte(data[0]).unwrap_or_default(),
            noise_canceling_mode: NoiseCancelingMode::from_byte(data[1]).unwrap_or_default(),
            transparency_mode: TransparencyMode::from_byte(data[2]).unwrap_or_default(),
            custom_noise_canceling: CustomNoiseCanceling::new(data[3]),
        }
    }

    pub fn with_ambient(mut self, mode: AmbientSoundMode) -> Self {
        self.ambient_sound_mode = mode;
        self
    }

    pub fn with_noise_canceling(mut self, mode: NoiseCancelingMode) -> Self {
        self.noise_canceling_mode = mode;
        self
    }
}

impl std::fmt::Display for SoundModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.ambient_sound_mode.as_str(),
            self.noise_canceling_mode.as_str(),
            self.transparency_mode.as_str(),
            self.custom_noise_canceling.value()
        )
    }
}
