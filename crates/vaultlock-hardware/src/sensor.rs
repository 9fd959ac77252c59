//! Request/response driver for the fingerprint module.
//!
//! Every operation sends one command frame and waits for one acknowledge.
//! The wait is a poll with a hard deadline measured from the start of the
//! read: bytes are collected as they arrive, the link is polled again after
//! a short pause, and when the deadline passes the operation fails with
//! [`Error::ProtocolTimeout`]. A partially received packet never yields a
//! confirmation code. The driver performs no retries of its own.

use crate::traits::SensorLink;
use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};
use vaultlock_core::{
    Error, Result, SensorConfig, SlotId, Timings,
    constants::MAX_FRAME_LEN,
};
use vaultlock_protocol::{
    CharBuffer, ConfirmationCode, SearchMatch, SensorCodec, SensorCommand, SensorResponse,
};

/// Result of a library search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub code: ConfirmationCode,
    /// Present when the search succeeded.
    pub found: Option<SearchMatch>,
}

/// AS608 protocol driver over any [`SensorLink`].
#[derive(Debug)]
pub struct FingerprintSensor<L: SensorLink> {
    link: L,
    codec: SensorCodec,
    address: u32,
    password: u32,
    timeout: Duration,
    poll_interval: Duration,
}

impl<L: SensorLink> FingerprintSensor<L> {
    pub fn new(link: L, sensor: &SensorConfig, timings: &Timings) -> Self {
        Self {
            link,
            codec: SensorCodec::new(),
            address: sensor.address,
            password: sensor.password,
            timeout: timings.sensor_timeout(),
            poll_interval: timings.sensor_poll(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Handshake with the configured module password.
    pub async fn verify_password(&mut self) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::verify_password(self.password))
            .await
    }

    /// Capture a finger image.
    pub async fn capture_image(&mut self) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::get_image()).await
    }

    /// Turn the captured image into a template in char buffer 1 or 2.
    pub async fn image_to_template(&mut self, buffer: CharBuffer) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::image_to_template(buffer)).await
    }

    /// Merge both char buffers into a model.
    pub async fn create_model(&mut self) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::create_model()).await
    }

    /// Store the model at the slot's page.
    pub async fn store_model(&mut self, slot: SlotId) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::store(slot.page_id())).await
    }

    /// Search the library with the template in char buffer 1.
    pub async fn search_model(&mut self) -> Result<SearchOutcome> {
        let response = self.transact(SensorCommand::search()).await?;
        Ok(SearchOutcome {
            code: response.confirmation(),
            found: response.search_match(),
        })
    }

    /// Delete the model stored at the slot's page.
    pub async fn delete_model(&mut self, slot: SlotId) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::delete(slot.page_id())).await
    }

    /// Erase the whole template library.
    pub async fn empty_database(&mut self) -> Result<ConfirmationCode> {
        self.code_of(SensorCommand::empty()).await
    }

    async fn code_of(&mut self, command: SensorCommand) -> Result<ConfirmationCode> {
        self.transact(command).await.map(|r| r.confirmation())
    }

    /// Send one command and wait for its acknowledge.
    pub async fn transact(&mut self, command: SensorCommand) -> Result<SensorResponse> {
        let instruction = command.instruction();
        self.discard_stale().await?;

        let mut frame = BytesMut::new();
        self.codec
            .encode(command.with_address(self.address), &mut frame)?;
        trace!("sensor tx {:02X?}", &frame[..]);
        self.link.write_all(&frame).await?;

        let response = self.read_response(instruction.response_len()).await?;
        debug!(%instruction, code = %response.confirmation(), "sensor acknowledged");
        Ok(response)
    }

    /// Drop bytes left over from an earlier exchange.
    async fn discard_stale(&mut self) -> Result<()> {
        let mut dropped = 0;
        while dropped < MAX_FRAME_LEN && self.link.try_read_byte().await?.is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "discarded stale bytes from sensor link");
        }
        Ok(())
    }

    async fn read_response(&mut self, expected_len: usize) -> Result<SensorResponse> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer = BytesMut::with_capacity(expected_len);

        loop {
            let mut received = false;
            while let Some(byte) = self.link.try_read_byte().await? {
                buffer.put_u8(byte);
                received = true;
                if buffer.len() >= MAX_FRAME_LEN {
                    break;
                }
            }

            if received && let Some(response) = self.codec.decode(&mut buffer)? {
                trace!("sensor rx {:02X?}", response.raw());
                let length = response.raw().len();
                if length != expected_len {
                    warn!(expected_len, length, "sensor acknowledge has the wrong length");
                    return Err(Error::InvalidFrame(format!(
                        "expected {expected_len}-byte acknowledge, got {length} bytes"
                    )));
                }
                return Ok(response);
            }

            if Instant::now() >= deadline {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(timeout_ms, received = buffer.len(), "sensor response timed out");
                return Err(Error::ProtocolTimeout(timeout_ms));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSensorLink;

    fn sensor(link: MockSensorLink) -> FingerprintSensor<MockSensorLink> {
        FingerprintSensor::new(link, &SensorConfig::default(), &Timings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_password_ok() {
        let (link, handle) = MockSensorLink::new();
        let mut sensor = sensor(link);
        assert_eq!(
            sensor.verify_password().await.unwrap(),
            ConfirmationCode::Success
        );
        assert_eq!(handle.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_sensor_times_out_after_deadline() {
        let (link, handle) = MockSensorLink::new();
        handle.set_silent(true);
        let mut sensor = sensor(link);

        let start = Instant::now();
        let result = sensor.capture_image().await;

        assert!(matches!(result, Err(Error::ProtocolTimeout(10_000))));
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_millis(10_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_outcome() {
        let (link, handle) = MockSensorLink::new();
        handle.store_template(4, 9);
        handle.place_finger(9);
        let mut sensor = sensor(link);

        sensor.capture_image().await.unwrap();
        sensor.image_to_template(CharBuffer::One).await.unwrap();
        let outcome = sensor.search_model().await.unwrap();

        assert_eq!(outcome.code, ConfirmationCode::Success);
        assert_eq!(outcome.found.unwrap().page_id, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_a_code_not_an_error() {
        let (link, _handle) = MockSensorLink::new();
        let mut sensor = sensor(link);
        assert_eq!(
            sensor.capture_image().await.unwrap(),
            ConfirmationCode::NoFinger
        );
    }
}
