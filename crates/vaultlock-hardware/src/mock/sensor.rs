//! Simulated AS608 fingerprint module.
//!
//! [`MockSensorLink`] implements [`SensorLink`] by decoding the command
//! frames written to it and queueing the acknowledge packets a real module
//! would send back. The handle controls which finger is on the glass, the
//! stored template library and scripted failures.

use crate::{Result, traits::SensorLink};
use bytes::{Buf, BytesMut};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::trace;
use vaultlock_core::constants::{DEFAULT_SENSOR_PASSWORD, SEARCH_PAGE_COUNT};
use vaultlock_protocol::{ConfirmationCode, Instruction, Packet, SensorCommand, SensorResponse};

/// Identity of a simulated finger.
pub type FingerId = u32;

/// Match score reported for every simulated search hit.
const MATCH_SCORE: u16 = 150;

#[derive(Debug)]
struct SensorState {
    password: u32,
    finger: Option<FingerId>,
    image: Option<FingerId>,
    char_buffers: [Option<FingerId>; 2],
    library: BTreeMap<u16, FingerId>,
    scripted: VecDeque<(Instruction, ConfirmationCode)>,
    silent: bool,
    commands: Vec<SensorCommand>,
}

impl SensorState {
    fn new(password: u32) -> Self {
        Self {
            password,
            finger: None,
            image: None,
            char_buffers: [None; 2],
            library: BTreeMap::new(),
            scripted: VecDeque::new(),
            silent: false,
            commands: Vec::new(),
        }
    }

    fn take_scripted(&mut self, instruction: Instruction) -> Option<ConfirmationCode> {
        let index = self
            .scripted
            .iter()
            .position(|(scripted, _)| *scripted == instruction)?;
        self.scripted.remove(index).map(|(_, code)| code)
    }

    fn execute(&mut self, command: &SensorCommand) -> Option<SensorResponse> {
        self.commands.push(command.clone());
        if self.silent {
            return None;
        }

        let instruction = command.instruction();
        if let Some(code) = self.take_scripted(instruction) {
            return Some(match instruction {
                Instruction::Search => SensorResponse::search(code, 0, 0),
                _ => SensorResponse::ack(code),
            });
        }

        let payload = command.payload();
        let response = match instruction {
            Instruction::VerifyPassword => {
                let matches = payload == self.password.to_be_bytes();
                SensorResponse::ack(if matches {
                    ConfirmationCode::Success
                } else {
                    ConfirmationCode::WrongPassword
                })
            }
            Instruction::GetImage => {
                self.image = self.finger;
                SensorResponse::ack(match self.finger {
                    Some(_) => ConfirmationCode::Success,
                    None => ConfirmationCode::NoFinger,
                })
            }
            Instruction::ImageToTemplate => {
                let code = match (payload.first().copied(), self.image) {
                    (Some(buffer @ 1..=2), Some(image)) => {
                        self.char_buffers[usize::from(buffer - 1)] = Some(image);
                        ConfirmationCode::Success
                    }
                    (Some(1..=2), None) => ConfirmationCode::NoValidImage,
                    _ => ConfirmationCode::PacketReceiveError,
                };
                SensorResponse::ack(code)
            }
            Instruction::CreateModel => SensorResponse::ack(match self.char_buffers {
                [Some(a), Some(b)] if a == b => ConfirmationCode::Success,
                _ => ConfirmationCode::MergeFailed,
            }),
            Instruction::Store => {
                let code = match (command.page_id(), self.char_buffers[0]) {
                    (Some(page), _) if page >= SEARCH_PAGE_COUNT => {
                        ConfirmationCode::AddressOutOfRange
                    }
                    (Some(page), Some(template)) => {
                        self.library.insert(page, template);
                        ConfirmationCode::Success
                    }
                    (Some(_), None) => ConfirmationCode::NoValidImage,
                    (None, _) => ConfirmationCode::PacketReceiveError,
                };
                SensorResponse::ack(code)
            }
            Instruction::Search => match self.char_buffers[0] {
                Some(template) => match self
                    .library
                    .iter()
                    .find(|(_, stored)| **stored == template)
                {
                    Some((page, _)) => {
                        SensorResponse::search(ConfirmationCode::Success, *page, MATCH_SCORE)
                    }
                    None => SensorResponse::search(ConfirmationCode::NoMatch, 0, 0),
                },
                None => SensorResponse::search(ConfirmationCode::NoValidImage, 0, 0),
            },
            Instruction::Delete => SensorResponse::ack(match command.page_id() {
                Some(page) if page < SEARCH_PAGE_COUNT => {
                    self.library.remove(&page);
                    ConfirmationCode::Success
                }
                _ => ConfirmationCode::DeleteFailed,
            }),
            Instruction::Empty => {
                self.library.clear();
                SensorResponse::ack(ConfirmationCode::Success)
            }
        };
        Some(response)
    }
}

type SharedState = Arc<Mutex<SensorState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SensorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serial link to a simulated fingerprint module.
///
/// # Examples
///
/// ```
/// use vaultlock_hardware::mock::MockSensorLink;
/// use vaultlock_hardware::traits::SensorLink;
/// use vaultlock_protocol::SensorCommand;
///
/// #[tokio::main]
/// async fn main() -> vaultlock_hardware::Result<()> {
///     let (mut link, handle) = MockSensorLink::new();
///     handle.place_finger(7);
///
///     link.write_all(&SensorCommand::get_image().to_bytes()).await?;
///
///     let mut reply = Vec::new();
///     while let Some(byte) = link.try_read_byte().await? {
///         reply.push(byte);
///     }
///     assert_eq!(reply.len(), 12);
///     assert_eq!(reply[9], 0x00);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockSensorLink {
    state: SharedState,
    inbound: BytesMut,
    outbound: VecDeque<u8>,
}

impl MockSensorLink {
    /// Module with the factory handshake password.
    pub fn new() -> (Self, MockSensorHandle) {
        Self::with_password(DEFAULT_SENSOR_PASSWORD)
    }

    pub fn with_password(password: u32) -> (Self, MockSensorHandle) {
        let state = Arc::new(Mutex::new(SensorState::new(password)));
        let link = Self {
            state: Arc::clone(&state),
            inbound: BytesMut::new(),
            outbound: VecDeque::new(),
        };
        (link, MockSensorHandle { state })
    }

    fn reply(&mut self, response: Option<SensorResponse>) {
        if let Some(response) = response {
            trace!("mock sensor replies {:02X?}", response.raw());
            self.outbound.extend(response.raw());
        }
    }
}

impl SensorLink for MockSensorLink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inbound.extend_from_slice(bytes);

        loop {
            match Packet::decode(&self.inbound) {
                Ok(Some((packet, used))) => {
                    self.inbound.advance(used);
                    let response = match SensorCommand::try_from(packet) {
                        Ok(command) => lock(&self.state).execute(&command),
                        Err(_) => Some(SensorResponse::ack(ConfirmationCode::PacketReceiveError)),
                    };
                    self.reply(response);
                }
                Ok(None) => break,
                Err(_) => {
                    self.inbound.clear();
                    self.reply(Some(SensorResponse::ack(
                        ConfirmationCode::PacketReceiveError,
                    )));
                    break;
                }
            }
        }
        Ok(())
    }

    async fn try_read_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.outbound.pop_front())
    }
}

/// Control handle for a [`MockSensorLink`].
#[derive(Debug, Clone)]
pub struct MockSensorHandle {
    state: SharedState,
}

impl MockSensorHandle {
    /// Put a finger on the glass.
    pub fn place_finger(&self, finger: FingerId) {
        lock(&self.state).finger = Some(finger);
    }

    pub fn lift_finger(&self) {
        lock(&self.state).finger = None;
    }

    /// Pre-load a template into the library.
    pub fn store_template(&self, page: u16, finger: FingerId) {
        lock(&self.state).library.insert(page, finger);
    }

    pub fn template_at(&self, page: u16) -> Option<FingerId> {
        lock(&self.state).library.get(&page).copied()
    }

    pub fn library(&self) -> BTreeMap<u16, FingerId> {
        lock(&self.state).library.clone()
    }

    /// Answer the next `instruction` with `code` instead of simulating it.
    pub fn fail_next(&self, instruction: Instruction, code: ConfirmationCode) {
        lock(&self.state).scripted.push_back((instruction, code));
    }

    /// Stop answering commands altogether.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<SensorCommand> {
        lock(&self.state).commands.clone()
    }

    pub fn count(&self, instruction: Instruction) -> usize {
        lock(&self.state)
            .commands
            .iter()
            .filter(|command| command.instruction() == instruction)
            .count()
    }

    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }
}
