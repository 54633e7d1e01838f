use super::models::DeviceCapabilityProfile;
use super::sound_modes::SoundModes;

/// Drop the parts of `desired` the device cannot apply.
///
/// Every field is checked on its own. An unsupported field keeps its value
/// from `current` while the supported fields of the same request go through.
pub fn filter_sound_modes(
    profile: &DeviceCapabilityProfile,
    current: &SoundModes,
    desired: &SoundModes,
) -> SoundModes {
    let support = profile.supports(desired, current);
    SoundModes {
        ambient_sound_mode: if support.ambient_sound_mode {
            desired.ambient_sound_mode
        } else {
            current.ambient_sound_mode
        },
        noise_canceling_mode: if support.noise_canceling_mode {
            desired.noise_canceling_mode
        } else {
            current.noise_canceling_mode
        },
        transparency_mode: if support.transparency_mode {
            desired.transparency_mode
        } else {
            current.transparency_mode
        },
        custom_noise_canceling: if support.custom_noise_canceling {
            desired.custom_noise_canceling
        } else {
            current.custom_noise_canceling
        },
    }
}
