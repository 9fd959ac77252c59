//! Lock flow state machine.
//!
//! The flow controller moves through a small set of states for every
//! session at the keypad:
//!
//! - `Idle`: main menu, waiting for a mode key (`A`..`D`)
//! - `EnrollSelectSlot` / `DeleteSelectSlot`: waiting for a template slot
//! - `VerifySelectUser`: waiting for a user slot
//! - `PasswordEntry`: collecting the four password keys
//! - `BiometricCapture(action)`: talking to the fingerprint module
//! - `WipeConfirm`: erasing the template library
//!
//! # Valid Transitions
//!
//! - Idle → EnrollSelectSlot → BiometricCapture(Enroll) → Idle
//! - Idle → VerifySelectUser → PasswordEntry → BiometricCapture(Verify) → Idle
//! - PasswordEntry → Idle (password rejected)
//! - Idle → DeleteSelectSlot → BiometricCapture(Delete) → Idle
//! - Idle → WipeConfirm → Idle
//!
//! # Examples
//!
//! ```
//! use vaultlock_controller::{LockState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), &LockState::Idle);
//!
//! machine.transition_to(LockState::VerifySelectUser).unwrap();
//! machine.transition_to(LockState::PasswordEntry).unwrap();
//! assert!(machine.transition_to(LockState::WipeConfirm).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use vaultlock_core::{Error, PasswordBuffer, Result, SlotId};

/// Maximum number of state transitions to keep in history.
///
/// A complete verify session is four transitions, so this covers the last
/// couple of dozen sessions.
const MAX_HISTORY_SIZE: usize = 100;

/// What the biometric stage does with the fingerprint module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricAction {
    /// Capture twice, merge and store at the selected slot.
    Enroll,
    /// Capture once and search the library.
    Verify,
    /// Delete the template at the selected slot.
    Delete,
}

impl fmt::Display for BiometricAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiometricAction::Enroll => write!(f, "Enroll"),
            BiometricAction::Verify => write!(f, "Verify"),
            BiometricAction::Delete => write!(f, "Delete"),
        }
    }
}

/// States of the lock flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Main menu.
    Idle,

    /// Waiting for the slot a new fingerprint is stored at.
    EnrollSelectSlot,

    /// Waiting for the user whose password and fingerprint are checked.
    VerifySelectUser,

    /// Waiting for the slot whose template is deleted.
    DeleteSelectSlot,

    /// Collecting the password of the selected user.
    PasswordEntry,

    /// Exchanging commands with the fingerprint module.
    BiometricCapture(BiometricAction),

    /// Erasing every stored template. Entered straight from the menu.
    WipeConfirm,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Idle => write!(f, "Idle"),
            LockState::EnrollSelectSlot => write!(f, "EnrollSelectSlot"),
            LockState::VerifySelectUser => write!(f, "VerifySelectUser"),
            LockState::DeleteSelectSlot => write!(f, "DeleteSelectSlot"),
            LockState::PasswordEntry => write!(f, "PasswordEntry"),
            LockState::BiometricCapture(action) => write!(f, "BiometricCapture({action})"),
            LockState::WipeConfirm => write!(f, "WipeConfirm"),
        }
    }
}

impl LockState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultlock_controller::{BiometricAction, LockState};
    ///
    /// assert!(LockState::Idle.can_transition_to(&LockState::EnrollSelectSlot));
    /// assert!(!LockState::Idle.can_transition_to(&LockState::PasswordEntry));
    /// assert!(
    ///     LockState::PasswordEntry
    ///         .can_transition_to(&LockState::BiometricCapture(BiometricAction::Verify))
    /// );
    /// ```
    pub fn can_transition_to(&self, target: &LockState) -> bool {
        use BiometricAction::{Delete, Enroll, Verify};

        matches!(
            (self, target),
            // From Idle
            (
                LockState::Idle,
                LockState::EnrollSelectSlot
                    | LockState::VerifySelectUser
                    | LockState::DeleteSelectSlot
                    | LockState::WipeConfirm
            )
            // Slot selection
            | (LockState::EnrollSelectSlot, LockState::BiometricCapture(Enroll))
            | (LockState::DeleteSelectSlot, LockState::BiometricCapture(Delete))
            | (LockState::VerifySelectUser, LockState::PasswordEntry)
            // Password check
            | (LockState::PasswordEntry, LockState::BiometricCapture(Verify) | LockState::Idle)
            // Terminal outcomes
            | (LockState::BiometricCapture(_) | LockState::WipeConfirm, LockState::Idle)
        )
    }

    /// Flow mode this state belongs to.
    pub fn mode(&self) -> FlowMode {
        match self {
            LockState::Idle => FlowMode::Idle,
            LockState::EnrollSelectSlot | LockState::BiometricCapture(BiometricAction::Enroll) => {
                FlowMode::Enroll
            }
            LockState::VerifySelectUser
            | LockState::PasswordEntry
            | LockState::BiometricCapture(BiometricAction::Verify) => FlowMode::Verify,
            LockState::DeleteSelectSlot | LockState::BiometricCapture(BiometricAction::Delete) => {
                FlowMode::Delete
            }
            LockState::WipeConfirm => FlowMode::WipeAll,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, LockState::Idle)
    }

    /// Whether the fingerprint module is in use in this state.
    pub fn is_biometric(&self) -> bool {
        matches!(self, LockState::BiometricCapture(_) | LockState::WipeConfirm)
    }
}

/// Operation selected on the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    #[default]
    Idle,
    Enroll,
    Verify,
    Delete,
    WipeAll,
}

impl fmt::Display for FlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowMode::Idle => write!(f, "idle"),
            FlowMode::Enroll => write!(f, "enroll"),
            FlowMode::Verify => write!(f, "verify"),
            FlowMode::Delete => write!(f, "delete"),
            FlowMode::WipeAll => write!(f, "wipe-all"),
        }
    }
}

/// Per-session data of the flow controller.
///
/// Reset to defaults when the controller starts and whenever a flow
/// reaches a terminal outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    pub mode: FlowMode,
    /// Slot picked on the keypad; `None` until one is selected.
    pub user_slot: Option<SlotId>,
    /// Failed biometric attempts in the current stage.
    pub retry_count: u8,
    pub entered_password: PasswordBuffer,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Start a biometric attempt sub-flow.
    pub fn begin_attempts(&mut self) {
        self.retry_count = 0;
    }

    /// Count one failed attempt, saturating at `max_attempts`.
    ///
    /// Returns `true` once the budget is used up.
    pub fn record_failed_attempt(&mut self, max_attempts: u8) -> bool {
        self.retry_count = (self.retry_count + 1).min(max_attempts);
        self.retry_count >= max_attempts
    }
}

/// Represents a single state transition with timestamp.
///
/// The `timestamp` field is not serialized as `Instant` is process-specific;
/// a deserialized transition carries the time of deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: LockState,
    pub to: LockState,
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: LockState, to: LockState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State machine for the lock flow.
///
/// Enforces the valid transitions and keeps a bounded history of the
/// transitions taken.
///
/// # Examples
///
/// ```
/// use vaultlock_controller::{BiometricAction, LockState, StateMachine};
///
/// let mut machine = StateMachine::new();
/// machine.transition_to(LockState::EnrollSelectSlot).unwrap();
/// machine
///     .transition_to(LockState::BiometricCapture(BiometricAction::Enroll))
///     .unwrap();
/// machine.transition_to(LockState::Idle).unwrap();
///
/// assert_eq!(machine.history().len(), 3);
/// ```
#[derive(Debug)]
pub struct StateMachine {
    current_state: LockState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: LockState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Create a builder for a machine starting in another state.
    ///
    /// ```
    /// use vaultlock_controller::{LockState, StateMachine};
    ///
    /// let machine = StateMachine::builder()
    ///     .with_initial_state(LockState::PasswordEntry)
    ///     .build();
    /// assert_eq!(machine.current_state(), &LockState::PasswordEntry);
    /// ```
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    pub fn current_state(&self) -> &LockState {
        &self.current_state
    }

    /// Time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Transitions taken, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `n` transitions, oldest first.
    pub fn last_transitions(&self, n: usize) -> Vec<&StateTransition> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).collect()
    }

    /// Attempt to transition to a new state.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not
    /// allowed from the current state. The machine is left unchanged.
    pub fn transition_to(&mut self, new_state: LockState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine back to Idle from any state.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, LockState::Idle);
        self.perform_state_change(LockState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: LockState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.add_to_history(transition);
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StateMachine` instances that do not start in Idle.
#[derive(Debug)]
pub struct StateMachineBuilder {
    initial_state: LockState,
}

impl StateMachineBuilder {
    pub fn with_initial_state(mut self, state: LockState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            current_state: self.initial_state,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}

impl Default for StateMachineBuilder {
    fn default() -> Self {
        Self {
            initial_state: LockState::Idle,
        }
    }
}
