//! Hardware layer of the vaultlock controller.
//!
//! This crate holds everything that touches a peripheral:
//!
//! - the device traits ([`KeypadLines`], [`SensorLink`], [`StatusDisplay`],
//!   [`LockActuator`]) that the flow controller is written against,
//! - the keypad engine: row strobe, edge capture, two-phase debounce, the
//!   single-slot key mailbox and the decoder ([`keypad`]),
//! - the fingerprint module driver ([`FingerprintSensor`]),
//! - the serial link to a real module (feature `hardware-serial`),
//! - simulated devices for tests and the CLI ([`mock`]).
//!
//! # Example
//!
//! ```no_run
//! use vaultlock_core::LockConfig;
//! use vaultlock_hardware::{FingerprintSensor, mock::MockSensorLink};
//!
//! # async fn example() -> vaultlock_core::Result<()> {
//! let config = LockConfig::default();
//! let (link, handle) = MockSensorLink::new();
//! handle.place_finger(1);
//!
//! let mut sensor = FingerprintSensor::new(link, &config.sensor, &config.timings);
//! let code = sensor.capture_image().await?;
//! assert!(code.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Device I/O fails with [`HardwareError`]; the sensor driver converts those
//! into [`vaultlock_core::Error`] so the flow controller sees a single error
//! type for everything that can go wrong in a sensor exchange.

pub mod error;
pub mod keypad;
pub mod mock;
pub mod sensor;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod traits;

pub use error::{HardwareError, Result};
pub use keypad::{KeyReceiver, KeySender, KeypadService, mailbox};
pub use sensor::{FingerprintSensor, SearchOutcome};
#[cfg(feature = "hardware-serial")]
pub use serial::{PortIo, SerialSensorLink};
pub use traits::{KeypadLines, LockActuator, SensorLink, StatusDisplay};
