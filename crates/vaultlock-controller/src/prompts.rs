//! Texts shown on the 16×2 LCD.
//!
//! Every prompt is two lines of at most 16 ASCII characters each. The
//! payload sent to the display is the top line padded to the line width
//! followed by the bottom line, so it wraps cleanly.

use std::fmt;
use vaultlock_core::constants::LCD_COLUMNS;

/// A two-line LCD message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prompt {
    pub top: &'static str,
    pub bottom: &'static str,
}

impl Prompt {
    pub const fn new(top: &'static str, bottom: &'static str) -> Self {
        Self { top, bottom }
    }

    /// The 32-character display payload.
    pub fn payload(&self) -> String {
        two_lines(self.top, self.bottom)
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom.is_empty() {
            write!(f, "{}", self.top)
        } else {
            write!(f, "{} {}", self.top, self.bottom)
        }
    }
}

/// Pad `top` to a full line and append `bottom`.
pub fn two_lines(top: &str, bottom: &str) -> String {
    format!("{top:<width$}{bottom}", width = LCD_COLUMNS)
}

pub const MENU: Prompt = Prompt::new("A:Enroll B:Open", "C:Delete D:Wipe");
pub const INVALID_KEY: Prompt = Prompt::new("Invalid key", "Use A, B, C or D");
pub const READY: Prompt = Prompt::new("Safe available", "");

pub const ENROLL_SLOT: Prompt = Prompt::new("Enroll: slot 1-9", "");
pub const VERIFY_USER: Prompt = Prompt::new("Open: enter", "user # 1-9");
pub const DELETE_SLOT: Prompt = Prompt::new("Delete: slot 1-9", "");
pub const WIPE: Prompt = Prompt::new("Wipe: erase all", "templates");

pub const ENTER_PASSWORD: Prompt = Prompt::new("Enter password", "");
pub const PASSWORD_OK: Prompt = Prompt::new("Password OK", "");
pub const PASSWORD_WRONG: Prompt = Prompt::new("Wrong password", "Session closed");
pub const TO_SENSOR: Prompt = Prompt::new("Moving to", "fingerprint");

pub const PLACE_FINGER: Prompt = Prompt::new("Place your", "finger");
pub const REPLACE_FINGER: Prompt = Prompt::new("Remove and", "place again");
pub const STEP_ERROR: Prompt = Prompt::new("Error. Remove", "and retry");
pub const WRONG_FINGER: Prompt = Prompt::new("Wrong finger", "Try again");
pub const LOCKED_OUT: Prompt = Prompt::new("Max attempts", "Locked out");

pub const ENROLLED: Prompt = Prompt::new("Fingerprint", "stored");
pub const ACCESS_GRANTED: Prompt = Prompt::new("Access granted", "");
pub const DELETED: Prompt = Prompt::new("Template", "deleted");
pub const DELETE_FAILED: Prompt = Prompt::new("Error deleting", "template");
pub const WIPED: Prompt = Prompt::new("Database", "wiped");
pub const WIPE_FAILED: Prompt = Prompt::new("Error wiping", "database");
