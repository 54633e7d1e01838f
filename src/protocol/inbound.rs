use crate::device::battery::{Battery, BatteryStatus};
use crate::device::equalizer::EqualizerConfiguration;
use crate::device::info::{DualFirmwareVersion, FirmwareVersion, HearIdInfo, SerialNumber};
use crate::device::models::DeviceFamily;
use crate::device::sound_modes::{AmbientSoundMode, NoiseCancelingMode, SoundModes};
use crate::device::DeviceState;
use crate::error::DecodeError;

use super::commands::*;
use super::packet::{Direction, SoundcorePacket, OUTBOUND_PREFIX};

/// Body length of a base full state update.
const STATE_BODY_LEN: usize = 60;
/// Base layout followed by seven bytes of extra settings.
const STATE_BODY_LEN_EXTENDED: usize = 67;

const EQUALIZER_BANDS: usize = 8;

/// A decoded notification from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Full device state. Replaces everything known about the device.
    StateUpdate(StateUpdate),
    /// Partial update of the sound modes. Only ambient and noise canceling
    /// mode are carried over into the device state.
    AmbientSoundModeUpdate {
        ambient_sound_mode: AmbientSoundMode,
        noise_canceling_mode: NoiseCancelingMode,
    },
    SetAmbientModeAck,
    SetEqualizerAck,
    /// One level per battery. Extra trailing bytes are dropped.
    BatteryLevelUpdate(Vec<u8>),
    FirmwareVersionUpdate {
        firmware: DualFirmwareVersion,
        serial_number: SerialNumber,
    },
    Unknown {
        command: CommandId,
        body: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub family: DeviceFamily,
    pub state: DeviceState,
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateUpdate(_) => "state_update",
            Self::AmbientSoundModeUpdate { .. } => "ambient_sound_mode_update",
            Self::SetAmbientModeAck => "set_ambient_mode_ack",
            Self::SetEqualizerAck => "set_equalizer_ack",
            Self::BatteryLevelUpdate(_) => "battery_level_update",
            Self::FirmwareVersionUpdate { .. } => "firmware_version_update",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Interpret the body of an inbound frame.
    pub fn from_frame(frame: &SoundcorePacket) -> Result<Self, DecodeError> {
        let body = frame.body.as_slice();
        match frame.command {
            CMD_STATE_UPDATE => parse_state_update(body).map(Self::StateUpdate),
            CMD_SOUND_MODE_UPDATE => parse_sound_mode_update(body),
            CMD_SET_SOUND_MODE => Ok(Self::SetAmbientModeAck),
            CMD_SET_EQUALIZER => Ok(Self::SetEqualizerAck),
            CMD_BATTERY_LEVEL_UPDATE => match body.len() {
                0 => Err(DecodeError::body(frame.command, "empty battery update")),
                1 => Ok(Self::BatteryLevelUpdate(body.to_vec())),
                _ => Ok(Self::BatteryLevelUpdate(body[..2].to_vec())),
            },
            CMD_FIRMWARE_VERSION_UPDATE => parse_firmware_update(body),
            command => Ok(Self::Unknown {
                command,
                body: body.to_vec(),
            }),
        }
    }
}

/// Decode raw notification bytes. Unknown commands are not an error.
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    let frame = SoundcorePacket::from_bytes(data)?;
    if frame.direction != Direction::Inbound {
        return Err(DecodeError::BadDirection(OUTBOUND_PREFIX));
    }
    Packet::from_frame(&frame)
}

fn parse_sound_mode_update(body: &[u8]) -> Result<Packet, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::body(
            CMD_SOUND_MODE_UPDATE,
            format!("expected at least 2 bytes, got {}", body.len()),
        ));
    }
    let ambient_sound_mode = AmbientSoundMode::from_byte(body[0]).ok_or_else(|| {
        DecodeError::body(
            CMD_SOUND_MODE_UPDATE,
            format!("invalid ambient sound mode {}", body[0]),
        )
    })?;
    let noise_canceling_mode = NoiseCancelingMode::from_byte(body[1]).ok_or_else(|| {
        DecodeError::body(
            CMD_SOUND_MODE_UPDATE,
            format!("invalid noise canceling mode {}", body[1]),
        )
    })?;
    Ok(Packet::AmbientSoundModeUpdate {
        ambient_sound_mode,
        noise_canceling_mode,
    })
}

fn parse_firmware_update(body: &[u8]) -> Result<Packet, DecodeError> {
    let fw_len = FirmwareVersion::WIRE_LEN * 2;
    if body.len() != fw_len + SerialNumber::WIRE_LEN {
        return Err(DecodeError::body(
            CMD_FIRMWARE_VERSION_UPDATE,
            format!("unexpected length {}", body.len()),
        ));
    }
    let firmware = DualFirmwareVersion::from_ascii(&body[..fw_len])
        .ok_or_else(|| DecodeError::body(CMD_FIRMWARE_VERSION_UPDATE, "bad firmware version"))?;
    let serial_number = SerialNumber::from_ascii(&body[fw_len..])
        .ok_or_else(|| DecodeError::body(CMD_FIRMWARE_VERSION_UPDATE, "bad serial number"))?;
    Ok(Packet::FirmwareVersionUpdate {
        firmware,
        serial_number,
    })
}

/// Full state layout:
///
/// ```text
/// [battery level] [charging] [equalizer: 10] [gender] [age range]
/// [hear id: enabled, left 8, right 8, time u32 LE] [sound modes: 4]
/// [firmware: 5 ASCII] [serial: 16 ASCII] (family specific trailer)
/// ```
///
/// The trailer is empty for the A3028 base layout, one wear detection byte
/// plus an optional touch byte for A3027, and seven setting bytes for the
/// extended A3028 layout.
fn parse_state_update(body: &[u8]) -> Result<StateUpdate, DecodeError> {
    let invalid = |reason: &str| DecodeError::body(CMD_STATE_UPDATE, reason);

    let family = match body.len() {
        STATE_BODY_LEN | STATE_BODY_LEN_EXTENDED => DeviceFamily::A3028,
        61 | 62 => DeviceFamily::A3027,
        n => {
            return Err(DecodeError::body(
                CMD_STATE_UPDATE,
                format!("unsupported state update length {}", n),
            ))
        }
    };

    let equalizer = EqualizerConfiguration::from_bytes(&body[2..12], 1, EQUALIZER_BANDS)
        .ok_or_else(|| invalid("bad equalizer configuration"))?;

    let offset = |b: &u8| *b as i16 - 120;
    let hear_id = HearIdInfo {
        gender: body[12],
        age_range: body[13],
        enabled: body[14] != 0,
        left: body[15..23].iter().map(offset).collect(),
        right: body[23..31].iter().map(offset).collect(),
        time: u32::from_le_bytes([body[31], body[32], body[33], body[34]]),
    };

    let sound_modes = SoundModes::from_bytes_lenient([body[35], body[36], body[37], body[38]]);

    let firmware = FirmwareVersion::from_ascii(&body[39..44])
        .ok_or_else(|| invalid("bad firmware version"))?;
    let serial_number =
        SerialNumber::from_ascii(&body[44..60]).ok_or_else(|| invalid("bad serial number"))?;

    let (wear_detection, touch_controls) = match (family, &body[STATE_BODY_LEN..]) {
        (DeviceFamily::A3027, [wear]) => (Some(*wear != 0), None),
        (DeviceFamily::A3027, [wear, touch]) => (Some(*wear != 0), Some(*touch != 0)),
        (DeviceFamily::A3028, [_, touch, ..]) => (None, Some(*touch != 0)),
        _ => (None, None),
    };

    let state = DeviceState {
        feature_flags: family.feature_flags(),
        sound_modes,
        equalizer,
        battery: Battery::Single(BatteryStatus {
            level: body[0],
            charging: body[1] != 0,
        }),
        firmware: DualFirmwareVersion {
            left: Some(firmware),
            right: None,
        },
        serial_number: Some(serial_number),
        hear_id: Some(hear_id),
        wear_detection,
        touch_controls,
    };

    Ok(StateUpdate { family, state })
}

/// Body of a full state update for `family`, as the device would send it.
pub(crate) fn state_update_body(family: DeviceFamily, state: &DeviceState) -> Vec<u8> {
    let battery = match state.battery {
        Battery::Single(status) => status,
        Battery::Dual { left, .. } => left,
    };
    let mut body = vec![battery.level, battery.charging as u8];

    let mut equalizer = state.equalizer.bytes();
    equalizer.resize(2 + EQUALIZER_BANDS, 120);
    body.extend_from_slice(&equalizer[..2 + EQUALIZER_BANDS]);

    let to_byte = |v: &i16| (*v + 120) as u8;
    match &state.hear_id {
        Some(hear_id) => {
            body.push(hear_id.gender);
            body.push(hear_id.age_range);
            body.push(hear_id.enabled as u8);
            body.extend(hear_id.left.iter().take(8).map(to_byte));
            body.extend(hear_id.right.iter().take(8).map(to_byte));
            body.extend_from_slice(&hear_id.time.to_le_bytes());
        }
        None => body.extend_from_slice(&[0u8; 23]),
    }

    body.extend_from_slice(&state.sound_modes.bytes());

    let firmware = state
        .firmware
        .left
        .map(|fw| fw.to_string())
        .unwrap_or_else(|| "00.00".to_string());
    body.extend_from_slice(firmware.as_bytes());

    let serial = state
        .serial_number
        .as_ref()
        .map(|sn| sn.as_str().to_string())
        .unwrap_or_else(|| "0".repeat(SerialNumber::WIRE_LEN));
    body.extend_from_slice(serial.as_bytes());

    if family == DeviceFamily::A3027 {
        body.push(state.wear_detection.unwrap_or(false) as u8);
        if let Some(touch) = state.touch_controls {
            body.push(touch as u8);
        }
    }
    body
}
