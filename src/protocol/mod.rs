pub mod checksum;
pub mod commands;
pub mod inbound;
pub mod outbound;
pub mod packet;

pub use inbound::{decode, Packet, StateUpdate};
pub use packet::SoundcorePacket;
