use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid slot {0}, expected 1-9")]
    InvalidSlot(u8),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    // Protocol errors
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Checksum mismatch: expected {expected:#06X}, got {actual:#06X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Sensor response timeout after {0}ms")]
    ProtocolTimeout(u64),

    #[error("Sensor rejected command with code {code:#04X}: {reason}")]
    SensorRejected { code: u8, reason: String },

    #[error("Sensor communication failed: {0}")]
    SensorLink(String),

    // Flow errors
    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u8 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure may be recovered by another biometric attempt.
    ///
    /// Sensor timeouts, rejections and link errors count against the
    /// attempt budget of the current stage; everything else does not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProtocolTimeout(_)
                | Error::SensorRejected { .. }
                | Error::SensorLink(_)
                | Error::InvalidFrame(_)
                | Error::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ProtocolTimeout(10_000).is_retryable());
        assert!(
            Error::SensorRejected {
                code: 0x02,
                reason: "no finger".to_string()
            }
            .is_retryable()
        );
        assert!(!Error::InvalidSlot(0).is_retryable());
        assert!(!Error::RetryBudgetExhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ProtocolTimeout(10_000).to_string(),
            "Sensor response timeout after 10000ms"
        );
        assert_eq!(
            Error::ChecksumMismatch {
                expected: 0x0005,
                actual: 0x0105
            }
            .to_string(),
            "Checksum mismatch: expected 0x0005, got 0x0105"
        );
        assert_eq!(
            Error::SensorRejected {
                code: 0x09,
                reason: "no matching fingerprint".to_string()
            }
            .to_string(),
            "Sensor rejected command with code 0x09: no matching fingerprint"
        );
    }
}
