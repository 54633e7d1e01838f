//! Control session for Soundcore headphones over Bluetooth LE.
//!
//! [`bluetooth::ConnectionManager`] connects to a bonded device and hands
//! back a [`device::session::DeviceSession`], which keeps the device state
//! and turns requests into protocol writes.

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
