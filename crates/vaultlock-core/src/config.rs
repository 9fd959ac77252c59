//! Runtime configuration of the lock.
//!
//! Every field has a default equal to the reference firmware, so an empty
//! JSON object is a valid configuration.
//!
//! ```
//! use vaultlock_core::LockConfig;
//!
//! let config = LockConfig::from_json_str(r#"{ "max_attempts": 2 }"#).unwrap();
//! assert_eq!(config.max_attempts, 2);
//! assert_eq!(config.sensor.baud_rate, 57_600);
//! ```

use crate::{
    Result,
    constants::*,
    error::Error,
    types::CredentialTable,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Pacing delays and ticks, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub row_tick_ms: u64,
    pub debounce_tick_ms: u64,
    pub sensor_timeout_ms: u64,
    pub sensor_poll_ms: u64,
    pub sensor_boot_ms: u64,
    pub prompt_dwell_ms: u64,
    pub result_dwell_ms: u64,
    pub relay_dwell_ms: u64,
    pub invalid_key_dwell_ms: u64,
    pub ready_dwell_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            row_tick_ms: DEFAULT_ROW_TICK_MS,
            debounce_tick_ms: DEFAULT_DEBOUNCE_TICK_MS,
            sensor_timeout_ms: DEFAULT_SENSOR_TIMEOUT_MS,
            sensor_poll_ms: DEFAULT_SENSOR_POLL_MS,
            sensor_boot_ms: DEFAULT_SENSOR_BOOT_MS,
            prompt_dwell_ms: DEFAULT_PROMPT_DWELL_MS,
            result_dwell_ms: DEFAULT_RESULT_DWELL_MS,
            relay_dwell_ms: DEFAULT_RELAY_DWELL_MS,
            invalid_key_dwell_ms: DEFAULT_INVALID_KEY_DWELL_MS,
            ready_dwell_ms: DEFAULT_READY_DWELL_MS,
        }
    }
}

impl Timings {
    pub fn row_tick(&self) -> Duration {
        Duration::from_millis(self.row_tick_ms)
    }

    pub fn debounce_tick(&self) -> Duration {
        Duration::from_millis(self.debounce_tick_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn sensor_poll(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_ms)
    }

    pub fn sensor_boot(&self) -> Duration {
        Duration::from_millis(self.sensor_boot_ms)
    }

    pub fn prompt_dwell(&self) -> Duration {
        Duration::from_millis(self.prompt_dwell_ms)
    }

    pub fn result_dwell(&self) -> Duration {
        Duration::from_millis(self.result_dwell_ms)
    }

    pub fn relay_dwell(&self) -> Duration {
        Duration::from_millis(self.relay_dwell_ms)
    }

    pub fn invalid_key_dwell(&self) -> Duration {
        Duration::from_millis(self.invalid_key_dwell_ms)
    }

    pub fn ready_dwell(&self) -> Duration {
        Duration::from_millis(self.ready_dwell_ms)
    }

    /// Zero delays everywhere except the ones the hardware needs to make
    /// progress. Useful for fast simulations.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            sensor_boot_ms: 0,
            prompt_dwell_ms: 0,
            result_dwell_ms: 0,
            relay_dwell_ms: 0,
            invalid_key_dwell_ms: 0,
            ready_dwell_ms: 0,
            ..Self::default()
        }
    }
}

/// Serial link settings for the fingerprint module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`. Only used by the serial link.
    pub port: String,
    pub baud_rate: u32,
    pub address: u32,
    /// Handshake password sent by `verify_password`.
    pub password: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            address: BROADCAST_ADDRESS,
            password: DEFAULT_SENSOR_PASSWORD,
        }
    }
}

/// Complete lock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub timings: Timings,
    pub sensor: SensorConfig,
    /// Biometric attempts per stage (1-3).
    pub max_attempts: u8,
    pub credentials: CredentialTable,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            sensor: SensorConfig::default(),
            max_attempts: MAX_ATTEMPTS,
            credentials: CredentialTable::reference(),
        }
    }
}

impl LockConfig {
    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, `Error::ConfigParse`
    /// on malformed JSON and `Error::Config` if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` on malformed JSON and `Error::Config` if
    /// validation fails.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LockConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Error::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            return Err(Error::Config(format!(
                "max_attempts must be 1-{MAX_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }

        let ticks = [
            ("row_tick_ms", self.timings.row_tick_ms),
            ("debounce_tick_ms", self.timings.debounce_tick_ms),
            ("sensor_timeout_ms", self.timings.sensor_timeout_ms),
            ("sensor_poll_ms", self.timings.sensor_poll_ms),
        ];
        if let Some((name, _)) = ticks.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }

        if self.sensor.baud_rate == 0 {
            return Err(Error::Config("sensor baud_rate must be greater than zero".into()));
        }

        self.credentials.validate()
    }
}
