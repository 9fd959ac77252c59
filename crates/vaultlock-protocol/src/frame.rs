//! Command packets of the sensor protocol.
//!
//! A [`SensorCommand`] carries an [`Instruction`] and its payload; the
//! length field and checksum of the [`Packet`] it travels in are always
//! derived from them, so a command can never be built with a stale trailer.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use vaultlock_core::{Error, Result, constants::*};

/// 16-bit wrapping sum used as the packet checksum.
///
/// The sum covers the packet identifier, both length bytes, the instruction
/// (or confirmation code) and the payload.
///
/// ```
/// use vaultlock_protocol::checksum;
///
/// // pid, length, GetImage
/// assert_eq!(checksum(&[0x01, 0x00, 0x03, 0x01]), 0x0005);
/// ```
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

/// Generic packet as it travels on the serial line.
///
/// # Wire Format
/// ```text
/// EF 01 | AA AA AA AA | PP | LL LL | content ... | CC CC
/// ```
/// `content` is the instruction and payload of a command, or the
/// confirmation code and payload of an acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub address: u32,
    pub pid: u8,
    pub content: Bytes,
}

impl Packet {
    pub fn new(address: u32, pid: u8, content: impl Into<Bytes>) -> Self {
        Self {
            address,
            pid,
            content: content.into(),
        }
    }

    /// Value of the length field: content plus checksum.
    pub fn length(&self) -> u16 {
        (self.content.len() + CHECKSUM_LEN) as u16
    }

    /// Total size of the encoded packet.
    pub fn size(&self) -> usize {
        FRAME_HEADER_LEN + self.content.len() + CHECKSUM_LEN
    }

    pub fn checksum(&self) -> u16 {
        let length = self.length().to_be_bytes();
        checksum(&[self.pid, length[0], length[1]]).wrapping_add(checksum(&self.content))
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.size());
        dst.put_slice(&FRAME_HEADER);
        dst.put_u32(self.address);
        dst.put_u8(self.pid);
        dst.put_u16(self.length());
        dst.put_slice(&self.content);
        dst.put_u16(self.checksum());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Try to parse one packet from the start of `src`.
    ///
    /// Returns `Ok(None)` while the packet is incomplete, otherwise the
    /// packet and the number of bytes it occupied.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrame` on a bad header or length field and
    /// `Error::ChecksumMismatch` when the trailing checksum is wrong.
    pub fn decode(src: &[u8]) -> Result<Option<(Packet, usize)>> {
        let header_len = src.len().min(FRAME_HEADER.len());
        if src[..header_len] != FRAME_HEADER[..header_len] {
            return Err(Error::InvalidFrame(format!(
                "bad start of packet {:02X?}",
                &src[..header_len]
            )));
        }
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let length = usize::from(u16::from_be_bytes([src[7], src[8]]));
        if length < 1 + CHECKSUM_LEN {
            return Err(Error::InvalidFrame(format!("length field {length} too short")));
        }

        let total = FRAME_HEADER_LEN + length;
        if src.len() < total {
            return Ok(None);
        }

        let body_end = total - CHECKSUM_LEN;
        let expected = checksum(&src[FRAME_PREFIX_LEN - 1..body_end]);
        let actual = u16::from_be_bytes([src[body_end], src[body_end + 1]]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let address = u32::from_be_bytes([src[2], src[3], src[4], src[5]]);
        let packet = Packet::new(
            address,
            src[6],
            Bytes::copy_from_slice(&src[FRAME_HEADER_LEN..body_end]),
        );
        Ok(Some((packet, total)))
    }
}

/// Instruction codes understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    GetImage = 0x01,
    ImageToTemplate = 0x02,
    Search = 0x04,
    CreateModel = 0x05,
    Store = 0x06,
    Delete = 0x0C,
    Empty = 0x0D,
    VerifyPassword = 0x13,
}

impl Instruction {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::GetImage),
            0x02 => Some(Self::ImageToTemplate),
            0x04 => Some(Self::Search),
            0x05 => Some(Self::CreateModel),
            0x06 => Some(Self::Store),
            0x0C => Some(Self::Delete),
            0x0D => Some(Self::Empty),
            0x13 => Some(Self::VerifyPassword),
            _ => None,
        }
    }

    /// Size of the acknowledge packet the sensor answers with.
    pub fn response_len(self) -> usize {
        match self {
            Self::Search => SEARCH_RESPONSE_LEN,
            _ => ACK_RESPONSE_LEN,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::GetImage => "GetImage",
            Self::ImageToTemplate => "ImageToTemplate",
            Self::Search => "Search",
            Self::CreateModel => "CreateModel",
            Self::Store => "Store",
            Self::Delete => "Delete",
            Self::Empty => "Empty",
            Self::VerifyPassword => "VerifyPassword",
        };
        write!(f, "{name}")
    }
}

/// Character buffer that receives a generated template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CharBuffer {
    One = 1,
    Two = 2,
}

impl CharBuffer {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CharBuffer {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(Error::InvalidFrame(format!("char buffer {other} out of range"))),
        }
    }
}

/// Command sent from the host to the sensor.
///
/// The checksum and length are always derived from the instruction and
/// payload when the command is encoded.
///
/// # Example
/// ```
/// use vaultlock_protocol::SensorCommand;
///
/// let bytes = SensorCommand::get_image().to_bytes();
/// assert_eq!(
///     &bytes[..],
///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorCommand {
    address: u32,
    instruction: Instruction,
    payload: Bytes,
}

impl SensorCommand {
    pub fn new(instruction: Instruction, payload: impl Into<Bytes>) -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            instruction,
            payload: payload.into(),
        }
    }

    /// Address the command to a specific module.
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Handshake with the module password.
    pub fn verify_password(password: u32) -> Self {
        Self::new(
            Instruction::VerifyPassword,
            Bytes::copy_from_slice(&password.to_be_bytes()),
        )
    }

    /// Capture a finger image into the image buffer.
    pub fn get_image() -> Self {
        Self::new(Instruction::GetImage, Bytes::new())
    }

    /// Generate a template from the image buffer into a char buffer.
    pub fn image_to_template(buffer: CharBuffer) -> Self {
        Self::new(
            Instruction::ImageToTemplate,
            Bytes::copy_from_slice(&[buffer.as_u8()]),
        )
    }

    /// Merge both char buffers into one model.
    pub fn create_model() -> Self {
        Self::new(Instruction::CreateModel, Bytes::new())
    }

    /// Store the model held in char buffer 1 at `page_id`.
    pub fn store(page_id: u16) -> Self {
        let [hi, lo] = page_id.to_be_bytes();
        Self::new(
            Instruction::Store,
            Bytes::copy_from_slice(&[CharBuffer::One.as_u8(), hi, lo]),
        )
    }

    /// Search the whole template library with char buffer 1.
    pub fn search() -> Self {
        let [start_hi, start_lo] = SEARCH_START_PAGE.to_be_bytes();
        let [count_hi, count_lo] = SEARCH_PAGE_COUNT.to_be_bytes();
        Self::new(
            Instruction::Search,
            Bytes::copy_from_slice(&[CharBuffer::One.as_u8(), start_hi, start_lo, count_hi, count_lo]),
        )
    }

    /// Delete the single template stored at `page_id`.
    pub fn delete(page_id: u16) -> Self {
        let [hi, lo] = page_id.to_be_bytes();
        Self::new(Instruction::Delete, Bytes::copy_from_slice(&[hi, lo, 0x00, 0x01]))
    }

    /// Erase every template in the library.
    pub fn empty() -> Self {
        Self::new(Instruction::Empty, Bytes::new())
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Page id carried by store and delete commands.
    pub fn page_id(&self) -> Option<u16> {
        match (self.instruction, &self.payload[..]) {
            (Instruction::Store, [_, hi, lo]) => Some(u16::from_be_bytes([*hi, *lo])),
            (Instruction::Delete, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let mut content = BytesMut::with_capacity(1 + self.payload.len());
        content.put_u8(self.instruction.as_u8());
        content.put_slice(&self.payload);
        Packet::new(self.address, PID_COMMAND, content.freeze())
    }

    pub fn checksum(&self) -> u16 {
        self.to_packet().checksum()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        self.to_packet().encode(dst);
    }

    pub fn to_bytes(&self) -> Bytes {
        self.to_packet().to_bytes()
    }

    /// Parse a complete command frame.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrame` if the bytes are not exactly one command
    /// packet, and `Error::ChecksumMismatch` on a corrupted checksum.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match Packet::decode(bytes)? {
            Some((packet, used)) if used == bytes.len() => Self::try_from(packet),
            Some((_, used)) => Err(Error::InvalidFrame(format!(
                "{} trailing bytes after command",
                bytes.len() - used
            ))),
            None => Err(Error::InvalidFrame("truncated command".into())),
        }
    }
}

impl TryFrom<Packet> for SensorCommand {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self> {
        if packet.pid != PID_COMMAND {
            return Err(Error::InvalidFrame(format!(
                "expected command packet, got pid {:#04X}",
                packet.pid
            )));
        }
        let (&code, payload) = packet
            .content
            .split_first()
            .ok_or_else(|| Error::InvalidFrame("empty command".into()))?;
        let instruction = Instruction::from_u8(code)
            .ok_or_else(|| Error::InvalidFrame(format!("unknown instruction {code:#04X}")))?;

        Ok(Self {
            address: packet.address,
            instruction,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

impl fmt::Display for SensorCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{:02X?}", self.instruction, &self.payload[..])
    }
}
