//! Mock lock relay that records every actuation.

use crate::{Result, traits::LockActuator};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::info;

/// One relay actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    Engaged(Instant),
    Released(Instant),
}

impl RelayEvent {
    pub fn at(&self) -> Instant {
        match self {
            Self::Engaged(at) | Self::Released(at) => *at,
        }
    }
}

type EventLog = Arc<Mutex<Vec<RelayEvent>>>;

fn lock(events: &EventLog) -> MutexGuard<'_, Vec<RelayEvent>> {
    events.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Relay that only records what it was told to do.
///
/// # Examples
///
/// ```
/// use vaultlock_hardware::mock::MockRelay;
/// use vaultlock_hardware::traits::LockActuator;
///
/// #[tokio::main]
/// async fn main() -> vaultlock_hardware::Result<()> {
///     let (mut relay, handle) = MockRelay::new();
///     relay.engage().await?;
///     assert!(handle.is_engaged());
///     relay.release().await?;
///     assert_eq!(handle.engage_count(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRelay {
    events: EventLog,
}

impl MockRelay {
    pub fn new() -> (Self, MockRelayHandle) {
        let events = EventLog::default();
        (
            Self {
                events: Arc::clone(&events),
            },
            MockRelayHandle { events },
        )
    }
}

impl LockActuator for MockRelay {
    async fn engage(&mut self) -> Result<()> {
        info!("relay engaged");
        lock(&self.events).push(RelayEvent::Engaged(Instant::now()));
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        info!("relay released");
        lock(&self.events).push(RelayEvent::Released(Instant::now()));
        Ok(())
    }
}

/// Read access to the actuations of a [`MockRelay`].
#[derive(Debug, Clone)]
pub struct MockRelayHandle {
    events: EventLog,
}

impl MockRelayHandle {
    pub fn events(&self) -> Vec<RelayEvent> {
        lock(&self.events).clone()
    }

    pub fn engage_count(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| matches!(event, RelayEvent::Engaged(_)))
            .count()
    }

    /// Whether the last actuation left the relay engaged.
    pub fn is_engaged(&self) -> bool {
        matches!(lock(&self.events).last(), Some(RelayEvent::Engaged(_)))
    }
}
