//! Acknowledge packets returned by the sensor.
//!
//! The confirmation code sits right after the length field. Search
//! acknowledges add the matched page and score.

use crate::frame::Packet;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use vaultlock_core::{Error, Result, constants::*};

/// Confirmation code carried by every acknowledge packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationCode {
    Success,
    PacketReceiveError,
    NoFinger,
    ImageCaptureFailed,
    ImageTooDisordered,
    TooFewFeaturePoints,
    NoMatch,
    MergeFailed,
    AddressOutOfRange,
    DeleteFailed,
    ClearFailed,
    WrongPassword,
    NoValidImage,
    FlashWriteError,
    Unknown(u8),
}

impl ConfirmationCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::PacketReceiveError,
            0x02 => Self::NoFinger,
            0x03 => Self::ImageCaptureFailed,
            0x06 => Self::ImageTooDisordered,
            0x07 => Self::TooFewFeaturePoints,
            0x09 => Self::NoMatch,
            0x0A => Self::MergeFailed,
            0x0B => Self::AddressOutOfRange,
            0x10 => Self::DeleteFailed,
            0x11 => Self::ClearFailed,
            0x13 => Self::WrongPassword,
            0x15 => Self::NoValidImage,
            0x18 => Self::FlashWriteError,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::PacketReceiveError => 0x01,
            Self::NoFinger => 0x02,
            Self::ImageCaptureFailed => 0x03,
            Self::ImageTooDisordered => 0x06,
            Self::TooFewFeaturePoints => 0x07,
            Self::NoMatch => 0x09,
            Self::MergeFailed => 0x0A,
            Self::AddressOutOfRange => 0x0B,
            Self::DeleteFailed => 0x10,
            Self::ClearFailed => 0x11,
            Self::WrongPassword => 0x13,
            Self::NoValidImage => 0x15,
            Self::FlashWriteError => 0x18,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::PacketReceiveError => "packet receive error",
            Self::NoFinger => "no finger on sensor",
            Self::ImageCaptureFailed => "failed to capture image",
            Self::ImageTooDisordered => "image too disordered",
            Self::TooFewFeaturePoints => "too few feature points",
            Self::NoMatch => "no matching fingerprint",
            Self::MergeFailed => "failed to merge templates",
            Self::AddressOutOfRange => "page id out of range",
            Self::DeleteFailed => "failed to delete template",
            Self::ClearFailed => "failed to clear library",
            Self::WrongPassword => "wrong module password",
            Self::NoValidImage => "no valid image in buffer",
            Self::FlashWriteError => "flash write error",
            Self::Unknown(_) => "unknown confirmation code",
        }
    }

    /// Convert a failure code into the matching error.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::SensorRejected {
                code: self.as_u8(),
                reason: self.description().to_string(),
            })
        }
    }
}

impl From<u8> for ConfirmationCode {
    fn from(code: u8) -> Self {
        Self::from_u8(code)
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#04X} ({})", self.as_u8(), self.description())
    }
}

/// Library hit reported by a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub page_id: u16,
    pub score: u16,
}

/// Acknowledge packet returned by the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorResponse {
    confirmation: ConfirmationCode,
    payload: Bytes,
    raw: Bytes,
}

impl SensorResponse {
    /// Build an acknowledge with extra payload after the confirmation code.
    pub fn new(confirmation: ConfirmationCode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut content = BytesMut::with_capacity(1 + payload.len());
        content.put_u8(confirmation.as_u8());
        content.put_slice(&payload);
        let raw = Packet::new(BROADCAST_ADDRESS, PID_ACK, content.freeze()).to_bytes();

        Self {
            confirmation,
            payload,
            raw,
        }
    }

    /// Plain 12-byte acknowledge.
    pub fn ack(confirmation: ConfirmationCode) -> Self {
        Self::new(confirmation, Bytes::new())
    }

    /// 16-byte search acknowledge.
    pub fn search(confirmation: ConfirmationCode, page_id: u16, score: u16) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u16(page_id);
        payload.put_u16(score);
        Self::new(confirmation, payload.freeze())
    }

    pub fn confirmation(&self) -> ConfirmationCode {
        self.confirmation
    }

    pub fn confirmation_code(&self) -> u8 {
        self.confirmation.as_u8()
    }

    pub fn is_success(&self) -> bool {
        self.confirmation.is_success()
    }

    /// Bytes following the confirmation code.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The complete packet as received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Page id and score, when this is a successful search acknowledge.
    pub fn search_match(&self) -> Option<SearchMatch> {
        match (self.is_success(), &self.payload[..]) {
            (true, [p_hi, p_lo, s_hi, s_lo, ..]) => Some(SearchMatch {
                page_id: u16::from_be_bytes([*p_hi, *p_lo]),
                score: u16::from_be_bytes([*s_hi, *s_lo]),
            }),
            _ => None,
        }
    }
}

impl TryFrom<Packet> for SensorResponse {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self> {
        if packet.pid != PID_ACK {
            return Err(Error::InvalidFrame(format!(
                "expected acknowledge packet, got pid {:#04X}",
                packet.pid
            )));
        }
        let raw = packet.to_bytes();
        if raw.len() < CONFIRMATION_OFFSET + 1 + CHECKSUM_LEN {
            return Err(Error::InvalidFrame(
                "acknowledge without confirmation code".into(),
            ));
        }

        Ok(Self {
            confirmation: ConfirmationCode::from_u8(raw[CONFIRMATION_OFFSET]),
            payload: raw.slice(CONFIRMATION_OFFSET + 1..raw.len() - CHECKSUM_LEN),
            raw,
        })
    }
}
