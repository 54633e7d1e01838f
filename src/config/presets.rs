use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::bluetooth::backend::MacAddr;
use crate::device::equalizer::EqualizerConfiguration;
use crate::device::sound_modes::{
    AmbientSoundMode, CustomNoiseCanceling, NoiseCancelingMode, SoundModes, TransparencyMode,
};

/// A named set of settings. Unset fields leave the device as it is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuickPreset {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_sound_mode: Option<AmbientSoundMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_canceling_mode: Option<NoiseCancelingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparency_mode: Option<TransparencyMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_noise_canceling: Option<CustomNoiseCanceling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<EqualizerConfiguration>,
}

impl QuickPreset {
    /// Overlay the set fields onto `modes`.
    pub fn apply_to(&self, modes: SoundModes) -> SoundModes {
        SoundModes {
            ambient_sound_mode: self.ambient_sound_mode.unwrap_or(modes.ambient_sound_mode),
            noise_canceling_mode: self
                .noise_canceling_mode
                .unwrap_or(modes.noise_canceling_mode),
            transparency_mode: self.transparency_mode.unwrap_or(modes.transparency_mode),
            custom_noise_canceling: self
                .custom_noise_canceling
                .unwrap_or(modes.custom_noise_canceling),
        }
    }
}

/// Named quick presets, per device.
pub trait ProfileStore: Send + Sync {
    fn get(&self, device: MacAddr, name: &str) -> Result<Option<QuickPreset>>;

    fn list(&self, device: MacAddr) -> Result<Vec<QuickPreset>>;

    /// Insert or replace the preset with the same name.
    fn put(&self, device: MacAddr, preset: QuickPreset) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    devices: BTreeMap<String, Vec<QuickPreset>>,
}

impl PresetFile {
    fn presets(&self, device: MacAddr) -> &[QuickPreset] {
        self.devices
            .get(&device.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Presets kept in a TOML file, one table per device address.
pub struct TomlProfileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlProfileStore {
    /// ~/.config/scqbuds/presets.toml
    pub fn default_path() -> PathBuf {
        super::config_dir().join("presets.toml")
    }

    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<PresetFile> {
        if !self.path.exists() {
            return Ok(PresetFile::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn write(&self, file: &PresetFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(file)?)?;
        tracing::info!("Presets saved to {}", self.path.display());
        Ok(())
    }
}

impl ProfileStore for TomlProfileStore {
    fn get(&self, device: MacAddr, name: &str) -> Result<Option<QuickPreset>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .read()?
            .presets(device)
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    fn list(&self, device: MacAddr) -> Result<Vec<QuickPreset>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.presets(device).to_vec())
    }

    fn put(&self, device: MacAddr, preset: QuickPreset) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.read()?;
        let presets = file.devices.entry(device.to_string()).or_default();
        match presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => presets.push(preset),
        }
        self.write(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::equalizer::PresetEqualizerProfile;

    const MAC: MacAddr = MacAddr([0xAC, 0x12, 0x2F, 0x00, 0x00, 0x01]);

    fn temp_store(name: &str) -> TomlProfileStore {
        let path = std::env::temp_dir()
            .join(format!("scqbuds-test-{}-{}", std::process::id(), name))
            .join("presets.toml");
        let _ = std::fs::remove_file(&path);
        TomlProfileStore::new(path)
    }

    #[test]
    fn test_apply_to_overlays_only_set_fields() {
        let preset = QuickPreset {
            name: "commute".into(),
            ambient_sound_mode: Some(AmbientSoundMode::NoiseCanceling),
            noise_canceling_mode: Some(NoiseCancelingMode::Transport),
            ..Default::default()
        };
        let base = SoundModes {
            transparency_mode: TransparencyMode::VocalMode,
            custom_noise_canceling: CustomNoiseCanceling::new(7),
            ..Default::default()
        };

        let applied = preset.apply_to(base);
        assert_eq!(applied.ambient_sound_mode, AmbientSoundMode::NoiseCanceling);
        assert_eq!(applied.noise_canceling_mode, NoiseCancelingMode::Transport);
        assert_eq!(applied.transparency_mode, TransparencyMode::VocalMode);
        assert_eq!(applied.custom_noise_canceling.value(), 7);
    }

    #[test]
    fn test_store_put_get_list() {
        let store = temp_store("put-get");
        assert!(store.list(MAC).unwrap().is_empty());

        let office = QuickPreset {
            name: "office".into(),
            ambient_sound_mode: Some(AmbientSoundMode::Transparency),
            equalizer: Some(EqualizerConfiguration::from_preset(
                PresetEqualizerProfile::Podcast,
                1,
            )),
            ..Default::default()
        };
        store.put(MAC, office.clone()).unwrap();
        store
            .put(
                MAC,
                QuickPreset {
                    name: "office".into(),
                    ambient_sound_mode: Some(AmbientSoundMode::Normal),
                    ..Default::default()
                },
            )
            .unwrap();

        let listed = store.list(MAC).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].ambient_sound_mode, Some(AmbientSoundMode::Normal));
        assert!(store.get(MAC, "missing").unwrap().is_none());

        let other = MacAddr([0; 6]);
        assert!(store.list(other).unwrap().is_empty());
    }
}
