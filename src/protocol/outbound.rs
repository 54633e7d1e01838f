use crate::device::equalizer::EqualizerConfiguration;
use crate::device::sound_modes::SoundModes;

use super::commands::*;
use super::packet::SoundcorePacket;

/// Ask the device for a full state update.
pub fn encode_request_state() -> Vec<u8> {
    SoundcorePacket::outbound(CMD_REQUEST_STATE, Vec::new()).to_bytes()
}

pub fn encode_set_sound_modes(modes: &SoundModes) -> Vec<u8> {
    SoundcorePacket::outbound(CMD_SET_SOUND_MODE, modes.bytes().to_vec()).to_bytes()
}

/// Profile id followed by the bands of every channel in the configuration.
pub fn encode_set_equalizer(config: &EqualizerConfiguration) -> Vec<u8> {
    SoundcorePacket::outbound(CMD_SET_EQUALIZER, config.bytes()).to_bytes()
}
