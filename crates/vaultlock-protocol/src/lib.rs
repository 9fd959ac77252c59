//! Wire protocol of the AS608-family fingerprint sensor.
//!
//! Commands are built as [`SensorCommand`] values, framed into [`Packet`]s and
//! written to the serial link; acknowledge packets coming back are decoded by
//! [`SensorCodec`] into [`SensorResponse`]s.

pub mod codec;
pub mod frame;
pub mod response;

pub use codec::SensorCodec;
pub use frame::{CharBuffer, Instruction, Packet, SensorCommand, checksum};
pub use response::{ConfirmationCode, SearchMatch, SensorResponse};
