use serde::{Deserialize, Serialize};

/// Profile id sent when the bands do not correspond to a built-in preset.
pub const CUSTOM_PROFILE_ID: u16 = 0xFEFE;

/// Built-in equalizer presets. The discriminant is the wire profile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetEqualizerProfile {
    SoundcoreSignature = 0x00,
    Acoustic = 0x01,
    BassBooster = 0x02,
    BassReducer = 0x03,
    Classical = 0x04,
    Podcast = 0x05,
    Dance = 0x06,
    Deep = 0x07,
    Electronic = 0x08,
    Flat = 0x09,
    HipHop = 0x0A,
    Jazz = 0x0B,
    Latin = 0x0C,
    Lounge = 0x0D,
    Piano = 0x0E,
    Pop = 0x0F,
    RnB = 0x10,
    Rock = 0x11,
    SmallSpeakers = 0x12,
    SpokenWord = 0x13,
    TrebleBooster = 0x14,
    TrebleReducer = 0x15,
}

impl PresetEqualizerProfile {
    pub const ALL: [Self; 22] = [
        Self::SoundcoreSignature,
        Self::Acoustic,
        Self::BassBooster,
        Self::BassReducer,
        Self::Classical,
        Self::Podcast,
        Self::Dance,
        Self::Deep,
        Self::Electronic,
        Self::Flat,
        Self::HipHop,
        Self::Jazz,
        Self::Latin,
        Self::Lounge,
        Self::Piano,
        Self::Pop,
        Self::RnB,
        Self::Rock,
        Self::SmallSpeakers,
        Self::SpokenWord,
        Self::TrebleBooster,
        Self::TrebleReducer,
    ];

    pub fn id(&self) -> u16 {
        *self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoundcoreSignature => "soundcore_signature",
            Self::Acoustic => "acoustic",
            Self::BassBooster => "bass_booster",
            Self::BassReducer => "bass_reducer",
            Self::Classical => "classical",
            Self::Podcast => "podcast",
            Self::Dance => "dance",
            Self::Deep => "deep",
            Self::Electronic => "electronic",
            Self::Flat => "flat",
            Self::HipHop => "hip_hop",
            Self::Jazz => "jazz",
            Self::Latin => "latin",
            Self::Lounge => "lounge",
            Self::Piano => "piano",
            Self::Pop => "pop",
            Self::RnB => "rnb",
            Self::Rock => "rock",
            Self::SmallSpeakers => "small_speakers",
            Self::SpokenWord => "spoken_word",
            Self::TrebleBooster => "treble_booster",
            Self::TrebleReducer => "treble_reducer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Band offsets in tenths of a dB.
    pub fn adjustments(&self) -> [i16; 8] {
        match self {
            Self::SoundcoreSignature => [0, 0, 0, 0, 0, 0, 0, 0],
            Self::Acoustic => [40, 10, 20, 20, 40, 40, 40, 20],
            Self::BassBooster => [40, 30, 10, 0, 0, 0, 0, 0],
            Self::BassReducer => [-40, -30, -10, 0, 0, 0, 0, 0],
            Self::Classical => [30, 30, -20, -20, 0, 20, 30, 40],
            Self::Podcast => [-30, 20, 40, 40, 30, 20, 0, -20],
            Self::Dance => [20, -30, -10, 10, 20, 20, 10, -30],
            Self::Deep => [20, 10, 30, 30, 20, -20, -40, -50],
            Self::Electronic => [30, 20, -20, 20, 10, 20, 30, 30],
            Self::Flat => [-20, -20, -10, 0, 0, 0, -20, -20],
            Self::HipHop => [20, 30, -10, -10, 20, -10, 20, 30],
            Self::Jazz => [20, 20, -20, -20, 0, 20, 30, 40],
            Self::Latin => [0, 0, -20, -20, -20, 0, 30, 50],
            Self::Lounge => [-10, 20, 40, 30, 0, -20, 20, 10],
            Self::Piano => [0, 30, 30, 20, 40, 50, 30, 40],
            Self::Pop => [-10, 10, 30, 30, 10, -10, -20, -30],
            Self::RnB => [60, 20, -20, -20, 20, 30, 30, 40],
            Self::Rock => [30, 20, -10, -10, 10, 30, 30, 30],
            Self::SmallSpeakers => [40, 30, 10, 0, -20, -30, -40, -40],
            Self::SpokenWord => [-30, -20, 10, 20, 20, 10, 0, -30],
            Self::TrebleBooster => [-20, -20, -20, -10, 10, 20, 20, 40],
            Self::TrebleReducer => [0, 0, 0, -20, -30, -40, -40, -60],
        }
    }
}

/// Per-band volume offsets for one channel, in tenths of a dB.
///
/// On the wire each band is one byte: `offset + 120`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<i16>", into = "Vec<i16>")]
pub struct VolumeAdjustments(Vec<i16>);

impl VolumeAdjustments {
    pub const MIN: i16 = -120;
    pub const MAX: i16 = 134;
    pub const MIN_BANDS: usize = 8;
    pub const MAX_BANDS: usize = 10;

    /// Build from band offsets. Offsets are clamped and the band count is
    /// padded or truncated into 8..=10.
    pub fn new(values: impl IntoIterator<Item = i16>) -> Self {
        let mut bands: Vec<i16> = values
            .into_iter()
            .take(Self::MAX_BANDS)
            .map(|v| v.clamp(Self::MIN, Self::MAX))
            .collect();
        bands.resize(bands.len().max(Self::MIN_BANDS), 0);
        Self(bands)
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self::new(data.iter().map(|&b| b as i16 - 120))
    }

    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().map(|&v| (v + 120) as u8)
    }

    pub fn values(&self) -> &[i16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Cut or zero-fill to `bands` bands, kept within 8..=10.
    pub fn with_band_count(&self, bands: usize) -> Self {
        let mut values = self.0.clone();
        values.resize(bands.clamp(Self::MIN_BANDS, Self::MAX_BANDS), 0);
        Self(values)
    }
}

impl From<Vec<i16>> for VolumeAdjustments {
    fn from(values: Vec<i16>) -> Self {
        Self::new(values)
    }
}

impl From<VolumeAdjustments> for Vec<i16> {
    fn from(adjustments: VolumeAdjustments) -> Self {
        adjustments.0
    }
}

impl From<PresetEqualizerProfile> for VolumeAdjustments {
    fn from(profile: PresetEqualizerProfile) -> Self {
        Self::new(profile.adjustments())
    }
}

/// Equalizer state: an optional preset plus the bands of every channel.
///
/// Compared by content. Two configurations are equal when the preset and
/// every band value match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEqualizerConfiguration")]
pub struct EqualizerConfiguration {
    preset: Option<PresetEqualizerProfile>,
    channels: Vec<VolumeAdjustments>,
}

#[derive(Deserialize)]
struct RawEqualizerConfiguration {
    preset: Option<PresetEqualizerProfile>,
    channels: Vec<VolumeAdjustments>,
}

impl TryFrom<RawEqualizerConfiguration> for EqualizerConfiguration {
    type Error = String;

    fn try_from(raw: RawEqualizerConfiguration) -> Result<Self, Self::Error> {
        if raw.channels.is_empty() {
            return Err("equalizer needs at least one channel".to_string());
        }
        Ok(Self {
            preset: raw.preset,
            channels: raw.channels,
        })
    }
}

impl Default for EqualizerConfiguration {
    fn default() -> Self {
        Self::from_preset(PresetEqualizerProfile::SoundcoreSignature, 1)
    }
}

impl EqualizerConfiguration {
    pub fn from_preset(profile: PresetEqualizerProfile, channels: usize) -> Self {
        Self {
            preset: Some(profile),
            channels: vec![VolumeAdjustments::from(profile); channels.max(1)],
        }
    }

    pub fn custom(channels: Vec<VolumeAdjustments>) -> Self {
        Self {
            preset: None,
            channels,
        }
    }

    pub fn preset_profile(&self) -> Option<PresetEqualizerProfile> {
        self.preset
    }

    pub fn profile_id(&self) -> u16 {
        self.preset.map(|p| p.id()).unwrap_or(CUSTOM_PROFILE_ID)
    }

    pub fn channels(&self) -> &[VolumeAdjustments] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&VolumeAdjustments> {
        self.channels.get(index)
    }

    /// Reshape to a device layout of `channels` x `bands`.
    ///
    /// Presets are expanded from their table, custom configurations repeat
    /// the last channel and every channel is cut or zero-filled to `bands`.
    pub fn fit(self, channels: usize, bands: usize) -> Self {
        let channels = channels.max(1);
        let mut fitted = match self.preset {
            Some(preset) => vec![VolumeAdjustments::from(preset); channels],
            None => {
                let mut custom = self.channels;
                let fill = custom
                    .last()
                    .cloned()
                    .unwrap_or_else(|| VolumeAdjustments::new([]));
                custom.resize(channels, fill);
                custom
            }
        };
        for channel in &mut fitted {
            if channel.len() != bands {
                *channel = channel.with_band_count(bands);
            }
        }
        Self {
            preset: self.preset,
            channels: fitted,
        }
    }

    /// Wire layout: profile id (u16 LE) followed by each channel's bands.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.profile_id().to_le_bytes().to_vec();
        for channel in &self.channels {
            out.extend(channel.bytes());
        }
        out
    }

    /// Parse `channels` x `bands` band bytes after a profile id.
    ///
    /// A profile id that is not a known preset is read as a custom profile
    /// using the transmitted bands.
    pub fn from_bytes(data: &[u8], channels: usize, bands: usize) -> Option<Self> {
        if data.len() != 2 + channels * bands {
            return None;
        }
        let id = u16::from_le_bytes([data[0], data[1]]);
        match PresetEqualizerProfile::from_id(id) {
            Some(profile) => Some(Self::from_preset(profile, channels)),
            None => Some(Self::custom(
                data[2..]
                    .chunks(bands)
                    .map(VolumeAdjustments::from_bytes)
                    .collect(),
            )),
        }
    }
}
