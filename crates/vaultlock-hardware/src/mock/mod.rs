//! Mock device implementations for testing and development.
//!
//! Simulated keypad matrix, fingerprint module and relay that can be driven
//! programmatically without physical hardware.

pub mod keypad;
pub mod relay;
pub mod sensor;

pub use keypad::{MockKeypadHandle, MockKeypadMatrix};
pub use relay::{MockRelay, MockRelayHandle, RelayEvent};
pub use sensor::{FingerId, MockSensorHandle, MockSensorLink};
