//! Hardware device trait definitions.
//!
//! These traits are the seams between the lock logic and its peripherals:
//! the keypad matrix lines, the serial link to the fingerprint module, the
//! character display and the lock relay. Mock implementations live in
//! [`crate::mock`]; the serial link is in `serial` behind the
//! `hardware-serial` feature.
//!
//! Async traits use native `async fn` (Edition 2024 RPITIT).

#![allow(async_fn_in_trait)]

use crate::error::Result;

/// GPIO lines of the 4×4 matrix keypad.
///
/// The methods are synchronous: they are called from the keypad service,
/// which stands in for interrupt context and must never await.
pub trait KeypadLines: Send {
    /// Drive exactly one row line high and all others low.
    fn drive_row(&mut self, row: u8);

    /// Sample the row and column lines.
    ///
    /// Row bits are in the low nibble, column bits in the high nibble.
    fn snapshot(&self) -> u8;
}

/// Byte link to the fingerprint module.
pub trait SensorLink: Send {
    /// Transmit a complete frame.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one byte if one is waiting; never blocks.
    async fn try_read_byte(&mut self) -> Result<Option<u8>>;
}

/// Two-line character display.
pub trait StatusDisplay: Send {
    /// Show a message of up to 32 characters.
    ///
    /// With `wrap` set the payload flows over both lines (16 characters
    /// each); otherwise only the first line is written.
    async fn show(&mut self, payload: &str, wrap: bool) -> Result<()>;

    async fn clear(&mut self) -> Result<()>;
}

/// Relay driving the lock bolt.
pub trait LockActuator: Send {
    async fn engage(&mut self) -> Result<()>;

    async fn release(&mut self) -> Result<()>;
}
