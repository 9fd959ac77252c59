//! Tokio codec for the sensor serial line.
//!
//! [`SensorCodec`] encodes [`SensorCommand`]s and decodes acknowledge packets
//! into [`SensorResponse`]s. The decoder validates the start-of-packet
//! marker, the packet identifier, the length field and the checksum; any
//! violation surfaces as an error rather than a partial confirmation code.
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::{Decoder, Encoder};
//! use vaultlock_protocol::{SensorCodec, SensorCommand, SensorResponse, ConfirmationCode};
//!
//! let mut codec = SensorCodec::new();
//!
//! let mut out = BytesMut::new();
//! codec.encode(SensorCommand::empty(), &mut out).unwrap();
//! assert_eq!(out.len(), 12);
//!
//! let ack = SensorResponse::ack(ConfirmationCode::Success);
//! let mut incoming = BytesMut::from(ack.raw());
//! let decoded = codec.decode(&mut incoming).unwrap().unwrap();
//! assert!(decoded.is_success());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use vaultlock_core::{
    Error, Result,
    constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN},
};

use crate::{Packet, SensorCommand, SensorResponse};

#[derive(Debug, Clone)]
pub struct SensorCodec {
    /// Frames larger than this are rejected before they are buffered.
    max_frame_size: usize,
}

impl SensorCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_LEN,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(Error::InvalidFrame(format!(
                "frame of {size} bytes exceeds limit of {}",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}

impl Default for SensorCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SensorCodec {
    type Item = SensorResponse;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() >= FRAME_HEADER_LEN {
            let declared = FRAME_HEADER_LEN + usize::from(u16::from_be_bytes([src[7], src[8]]));
            self.check_size(declared)?;
        }

        match Packet::decode(src)? {
            Some((packet, used)) => {
                src.advance(used);
                SensorResponse::try_from(packet).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl Encoder<SensorCommand> for SensorCodec {
    type Error = Error;

    fn encode(&mut self, item: SensorCommand, dst: &mut BytesMut) -> Result<()> {
        let packet = item.to_packet();
        self.check_size(packet.size())?;
        packet.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfirmationCode;

    #[test]
    fn test_codec_default() {
        assert_eq!(SensorCodec::default().max_frame_size(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = SensorCodec::new();
        let raw = SensorResponse::ack(ConfirmationCode::NoFinger).raw().to_vec();

        let mut buffer = BytesMut::from(&raw[..5]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(&raw[5..]);
        let response = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(response.confirmation(), ConfirmationCode::NoFinger);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_two_responses() {
        let mut codec = SensorCodec::new();
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(SensorResponse::ack(ConfirmationCode::Success).raw());
        buffer.extend_from_slice(SensorResponse::search(ConfirmationCode::Success, 4, 77).raw());

        assert!(codec.decode(&mut buffer).unwrap().unwrap().is_success());
        let search = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(search.search_match().unwrap().page_id, 4);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_command_echo() {
        let mut codec = SensorCodec::new();
        let mut buffer = BytesMut::from(&SensorCommand::get_image().to_bytes()[..]);
        assert!(matches!(codec.decode(&mut buffer), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut codec = SensorCodec::new();
        let mut buffer = BytesMut::from(
            &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x01, 0x00][..],
        );
        assert!(matches!(codec.decode(&mut buffer), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_encode_respects_limit() {
        let mut codec = SensorCodec { max_frame_size: 11 };
        let mut buffer = BytesMut::new();
        assert!(codec.encode(SensorCommand::get_image(), &mut buffer).is_err());
        assert!(buffer.is_empty());
    }
}
