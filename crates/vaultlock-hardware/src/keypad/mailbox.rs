//! Single-slot mailbox between the keypad service and the foreground loop.
//!
//! The sender side posts raw row/column snapshots without ever waiting; a
//! snapshot posted while the slot is still occupied is dropped. The
//! receiver decodes each snapshot into a [`KeyEvent`].

use crate::{HardwareError, Result, keypad::decode};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use vaultlock_core::KeyEvent;

/// Create a connected mailbox pair with room for exactly one key.
pub fn mailbox() -> (KeySender, KeyReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (KeySender { tx }, KeyReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct KeySender {
    tx: mpsc::Sender<u8>,
}

impl KeySender {
    /// Post a captured snapshot.
    ///
    /// Returns `Ok(false)` when a key is already waiting and this one was
    /// dropped.
    ///
    /// # Errors
    /// Returns `HardwareError::Disconnected` once the receiver is gone.
    pub fn post(&self, snapshot: u8) -> Result<bool> {
        match self.tx.try_send(snapshot) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(dropped)) => {
                warn!("key mailbox full, dropping snapshot {dropped:#04X}");
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(HardwareError::disconnected("key mailbox")),
        }
    }
}

#[derive(Debug)]
pub struct KeyReceiver {
    rx: mpsc::Receiver<u8>,
}

impl KeyReceiver {
    /// Wait for the next key. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<KeyEvent> {
        self.rx.recv().await.map(Self::decode)
    }

    /// Take the waiting key, if any.
    pub fn try_recv(&mut self) -> Option<KeyEvent> {
        self.rx.try_recv().ok().map(Self::decode)
    }

    /// Discard a waiting key; returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded stale keys");
        }
        dropped
    }

    fn decode(snapshot: u8) -> KeyEvent {
        let code = decode(snapshot);
        debug!("decoded snapshot {snapshot:#04X} as {code}");
        KeyEvent::new(code)
    }
}
