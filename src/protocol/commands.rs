/// Command IDs for the Soundcore BLE protocol.
/// Format: [group, command] as sent on the wire after the direction bytes.
pub type CommandId = [u8; 2];

// State
pub const CMD_STATE_UPDATE: CommandId = [0x01, 0x01];
pub const CMD_REQUEST_STATE: CommandId = CMD_STATE_UPDATE;

// Battery
pub const CMD_BATTERY_LEVEL_UPDATE: CommandId = [0x01, 0x03];

// Device info
pub const CMD_FIRMWARE_VERSION_UPDATE: CommandId = [0x01, 0x05];

// Sound modes
pub const CMD_SOUND_MODE_UPDATE: CommandId = [0x06, 0x01];
pub const CMD_SET_SOUND_MODE: CommandId = [0x06, 0x81];

// Equalizer
pub const CMD_SET_EQUALIZER: CommandId = [0x02, 0x81];
