//! Property-based tests for sensor framing.

use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::Decoder;
use vaultlock_protocol::{
    CharBuffer, ConfirmationCode, SensorCodec, SensorCommand, SensorResponse, checksum,
};

/// Strategy covering every command the driver can issue.
fn any_command() -> impl Strategy<Value = SensorCommand> {
    prop_oneof![
        any::<u32>().prop_map(SensorCommand::verify_password),
        Just(SensorCommand::get_image()),
        Just(SensorCommand::image_to_template(CharBuffer::One)),
        Just(SensorCommand::image_to_template(CharBuffer::Two)),
        Just(SensorCommand::create_model()),
        any::<u16>().prop_map(SensorCommand::store),
        Just(SensorCommand::search()),
        any::<u16>().prop_map(SensorCommand::delete),
        Just(SensorCommand::empty()),
    ]
}

proptest! {
    /// Built frames parse back to the same command and carry their checksum
    /// in the trailing two bytes.
    #[test]
    fn prop_command_frames_parse_back(
        command in any_command(),
        address in any::<u32>(),
    ) {
        let command = command.with_address(address);
        let bytes = command.to_bytes();

        let trailer = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        prop_assert_eq!(trailer, command.checksum());
        prop_assert_eq!(trailer, checksum(&bytes[6..bytes.len() - 2]));

        let length = usize::from(u16::from_be_bytes([bytes[7], bytes[8]]));
        prop_assert_eq!(bytes.len(), 9 + length);

        prop_assert_eq!(SensorCommand::parse(&bytes).unwrap(), command);
    }

    /// Flipping any single bit of a response never yields a successful
    /// decode with a different confirmation code.
    #[test]
    fn prop_corrupted_response_never_misreports(
        code in any::<u8>(),
        index in 0usize..12,
        bit in 0u8..8,
    ) {
        let response = SensorResponse::ack(ConfirmationCode::from_u8(code));
        let mut raw = response.raw().to_vec();
        raw[index] ^= 1 << bit;

        let mut codec = SensorCodec::new();
        let mut buffer = BytesMut::from(&raw[..]);
        if let Ok(Some(decoded)) = codec.decode(&mut buffer) {
            // Only a flip inside the address field leaves the packet valid.
            prop_assert!((2..6).contains(&index));
            prop_assert_eq!(decoded.confirmation_code(), code);
        }
    }

    /// The decoder never panics on arbitrary input.
    #[test]
    fn prop_decoder_total(bytes in prop::collection::vec(any::<u8>(), 0..80)) {
        let mut codec = SensorCodec::new();
        let mut buffer = BytesMut::from(&bytes[..]);
        let _ = codec.decode(&mut buffer);
    }
}
