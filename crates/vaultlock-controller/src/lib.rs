//! Authentication flow controller for the vaultlock.
//!
//! This crate contains the state machine that sequences mode selection,
//! credential entry and the biometric stage, the prompts shown along the
//! way, the virtual 16×2 LCD used on the host, and the [`FlowController`]
//! that ties keypad events, the fingerprint module and the lock relay
//! together.

pub mod controller;
pub mod display;
pub mod prompts;
pub mod state_machine;

pub use controller::{FlowController, FlowOutcome};
pub use display::{LcdFrame, VirtualLcd};
pub use prompts::Prompt;
pub use state_machine::{
    BiometricAction, FlowMode, FlowState, LockState, StateMachine, StateMachineBuilder,
    StateTransition,
};
