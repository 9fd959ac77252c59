use crate::{
    Result,
    constants::{MAX_SLOT, MIN_SLOT, PASSWORD_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Logical key of the 4×4 matrix keypad.
///
/// The keypad carries the digits 0-9 and the letters A-F. Masks that do not
/// correspond to exactly one row and one column decode to [`KeyCode::Invalid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// Numeric digit (0-9).
    Digit(u8),
    A,
    B,
    C,
    D,
    E,
    F,
    /// Sentinel for masks outside the decode table.
    Invalid,
}

impl KeyCode {
    /// Create a digit key.
    ///
    /// # Errors
    /// Returns `Error::InvalidKey` if the digit is greater than 9.
    pub fn digit(d: u8) -> Result<Self> {
        if d > 9 {
            return Err(Error::InvalidKey(format!("Digit must be 0-9, got {d}")));
        }
        Ok(Self::Digit(d))
    }

    /// Map a 4-bit key value (0x0-0xF) to its key.
    ///
    /// Values above 0xF map to `Invalid`.
    #[must_use]
    pub fn from_value(value: u8) -> Self {
        match value {
            0..=9 => Self::Digit(value),
            0x0A => Self::A,
            0x0B => Self::B,
            0x0C => Self::C,
            0x0D => Self::D,
            0x0E => Self::E,
            0x0F => Self::F,
            _ => Self::Invalid,
        }
    }

    /// The 4-bit value of the key, `None` for `Invalid`.
    #[must_use]
    pub fn value(&self) -> Option<u8> {
        match self {
            Self::Digit(d) if *d <= 9 => Some(*d),
            Self::Digit(_) | Self::Invalid => None,
            Self::A => Some(0x0A),
            Self::B => Some(0x0B),
            Self::C => Some(0x0C),
            Self::D => Some(0x0D),
            Self::E => Some(0x0E),
            Self::F => Some(0x0F),
        }
    }

    /// Parse a key from its label (`0`-`9`, `A`-`F`, case-insensitive).
    ///
    /// # Errors
    /// Returns `Error::InvalidKey` for any other character.
    pub fn from_char(c: char) -> Result<Self> {
        c.to_digit(16)
            .map(|v| Self::from_value(v as u8))
            .ok_or_else(|| Error::InvalidKey(format!("'{c}' is not a keypad key")))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value().is_some()
    }

    /// Get the digit value if this is a digit key.
    #[must_use]
    pub fn as_digit(&self) -> Option<u8> {
        match self {
            Self::Digit(d) if *d <= 9 => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{v:X}"),
            None => write!(f, "?"),
        }
    }
}

/// One captured keypress, handed from the keypad engine to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub code: KeyCode,
}

impl KeyEvent {
    #[must_use]
    pub fn new(code: KeyCode) -> Self {
        Self { code }
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::new(code)
    }
}

/// User / fingerprint template slot (1-9).
///
/// The same number addresses the credential table and the template page
/// inside the sensor database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    /// Create a new slot with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlot` if the slot is outside 1-9.
    pub fn new(slot: u8) -> Result<Self> {
        if !(MIN_SLOT..=MAX_SLOT).contains(&slot) {
            return Err(Error::InvalidSlot(slot));
        }
        Ok(SlotId(slot))
    }

    /// Select a slot with a single keypress.
    ///
    /// Only the digit keys 1-9 select a slot; `0`, the letters and invalid
    /// keys are rejected.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlot` for any key outside 1-9.
    pub fn from_key(code: KeyCode) -> Result<Self> {
        match code.as_digit() {
            Some(d) => Self::new(d),
            None => Err(Error::InvalidSlot(code.value().unwrap_or(0xFF))),
        }
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Template page id used by the sensor for this slot.
    #[must_use]
    pub fn page_id(&self) -> u16 {
        u16::from(self.0)
    }
}

impl TryFrom<u8> for SlotId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        SlotId::new(value)
    }
}

impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> Self {
        slot.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A four-key password, stored in entry order.
///
/// # Security
/// Comparison is constant-time so the number of matching leading keys does
/// not leak through timing.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Password([u8; PASSWORD_LENGTH]);

impl Password {
    /// Create a password from four keys in entry order.
    ///
    /// # Errors
    /// Returns `Error::InvalidPassword` if any key is `Invalid`.
    pub fn new(keys: [KeyCode; PASSWORD_LENGTH]) -> Result<Self> {
        let mut values = [0u8; PASSWORD_LENGTH];
        for (slot, key) in values.iter_mut().zip(keys) {
            *slot = key
                .value()
                .ok_or_else(|| Error::InvalidPassword("password contains an invalid key".into()))?;
        }
        Ok(Password(values))
    }

    /// The keys in entry order.
    #[must_use]
    pub fn keys(&self) -> [KeyCode; PASSWORD_LENGTH] {
        self.0.map(KeyCode::from_value)
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::str::FromStr for Password {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let keys = s
            .trim()
            .chars()
            .map(KeyCode::from_char)
            .collect::<Result<Vec<_>>>()
            .map_err(|_| Error::InvalidPassword(format!("'{s}' contains a non-keypad character")))?;

        let keys: [KeyCode; PASSWORD_LENGTH] = keys.try_into().map_err(|keys: Vec<KeyCode>| {
            Error::InvalidPassword(format!(
                "Password must be {PASSWORD_LENGTH} keys, got {}",
                keys.len()
            ))
        })?;

        Password::new(keys)
    }
}

impl TryFrom<String> for Password {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Password> for String {
    fn from(password: Password) -> Self {
        password.to_string()
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for value in self.0 {
            write!(f, "{value:X}")?;
        }
        Ok(())
    }
}

/// Most-recent-first shift register collecting a password on the keypad.
///
/// Each new key is inserted at position 0 and older keys shift one place
/// towards the end; the oldest key falls off once the register is full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordBuffer {
    keys: [Option<KeyCode>; PASSWORD_LENGTH],
    count: usize,
}

impl PasswordBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift a key into the register.
    ///
    /// # Errors
    /// Returns `Error::InvalidKey` for `KeyCode::Invalid`; the register is
    /// left untouched.
    pub fn push(&mut self, code: KeyCode) -> Result<()> {
        if !code.is_valid() {
            return Err(Error::InvalidKey("invalid key in password entry".into()));
        }
        self.keys.rotate_right(1);
        self.keys[0] = Some(code);
        self.count = (self.count + 1).min(PASSWORD_LENGTH);
        Ok(())
    }

    /// Number of keys collected (saturates at the password length).
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.count == PASSWORD_LENGTH
    }

    /// Raw register contents, most recent key first.
    #[must_use]
    pub fn most_recent_first(&self) -> &[Option<KeyCode>; PASSWORD_LENGTH] {
        &self.keys
    }

    /// The collected password in entry order, once complete.
    #[must_use]
    pub fn entered(&self) -> Option<Password> {
        if !self.is_complete() {
            return None;
        }
        let mut keys = [KeyCode::Invalid; PASSWORD_LENGTH];
        for (dst, src) in keys.iter_mut().zip(self.keys.iter().rev()) {
            *dst = (*src)?;
        }
        Password::new(keys).ok()
    }

    /// Compare the register against a stored password.
    ///
    /// An incomplete register never matches.
    #[must_use]
    pub fn matches(&self, stored: &Password) -> bool {
        self.entered().is_some_and(|entered| entered == *stored)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Statically provisioned credential for one user slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub slot: SlotId,
    pub password: Password,
}

/// Read-only table of user credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialTable(Vec<Credential>);

impl CredentialTable {
    /// Build a table, rejecting duplicate slots.
    ///
    /// # Errors
    /// Returns `Error::Config` if a slot appears more than once.
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        let table = CredentialTable(credentials);
        table.validate()?;
        Ok(table)
    }

    /// Reference provisioning shipped with the lock.
    ///
    /// Slot 1 → 1234, slot 2 → 4321, slot 3 → 0000, slots 4-9 → 1111-6666.
    #[must_use]
    pub fn reference() -> Self {
        const PASSWORDS: [[u8; PASSWORD_LENGTH]; 9] = [
            [1, 2, 3, 4],
            [4, 3, 2, 1],
            [0, 0, 0, 0],
            [1, 1, 1, 1],
            [2, 2, 2, 2],
            [3, 3, 3, 3],
            [4, 4, 4, 4],
            [5, 5, 5, 5],
            [6, 6, 6, 6],
        ];

        CredentialTable(
            PASSWORDS
                .iter()
                .zip(MIN_SLOT..=MAX_SLOT)
                .map(|(digits, slot)| Credential {
                    slot: SlotId(slot),
                    password: Password(*digits),
                })
                .collect(),
        )
    }

    /// Look up the password provisioned for a slot.
    #[must_use]
    pub fn password_for(&self, slot: SlotId) -> Option<&Password> {
        self.0
            .iter()
            .find(|credential| credential.slot == slot)
            .map(|credential| &credential.password)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.0.iter()
    }

    /// # Errors
    /// Returns `Error::Config` if a slot appears more than once.
    pub fn validate(&self) -> Result<()> {
        let mut seen = [false; MAX_SLOT as usize + 1];
        for credential in &self.0 {
            let idx = usize::from(credential.slot.as_u8());
            if seen[idx] {
                return Err(Error::Config(format!(
                    "Duplicate credential for slot {}",
                    credential.slot
                )));
            }
            seen[idx] = true;
        }
        Ok(())
    }
}

impl Default for CredentialTable {
    fn default() -> Self {
        Self::reference()
    }
}
