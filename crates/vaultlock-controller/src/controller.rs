//! Foreground flow controller.
//!
//! [`FlowController`] consumes one [`KeyEvent`] at a time and walks the
//! [`StateMachine`] through mode selection, slot or user selection,
//! password entry and the biometric stage. The biometric stage runs to
//! completion inside the key handler that starts it; keys pressed in the
//! meantime are discarded once the flow is back at the menu.
//!
//! Sensor timeouts and non-zero confirmation codes are the same thing to
//! the controller: one failed attempt. After `max_attempts` failed attempts
//! the stage ends locked out. Nothing is fatal; every flow ends at `Idle`.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use vaultlock_core::{
    CredentialTable, Error, KeyCode, KeyEvent, LockConfig, Result, SlotId, Timings,
};
use vaultlock_hardware::{
    FingerprintSensor, KeyReceiver, LockActuator, SensorLink, StatusDisplay,
};
use vaultlock_protocol::{CharBuffer, ConfirmationCode, SearchMatch};

use crate::prompts::{self, Prompt, two_lines};
use crate::state_machine::{BiometricAction, FlowMode, FlowState, LockState, StateMachine};

/// Terminal result of one session at the keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Enrolled(SlotId),
    AccessGranted(SlotId),
    Deleted(SlotId),
    DeleteFailed(SlotId),
    Wiped,
    WipeFailed,
    /// The biometric attempt budget ran out.
    LockedOut(FlowMode),
    PasswordRejected(SlotId),
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowOutcome::Enrolled(slot) => write!(f, "fingerprint enrolled at slot {slot}"),
            FlowOutcome::AccessGranted(slot) => write!(f, "access granted to user {slot}"),
            FlowOutcome::Deleted(slot) => write!(f, "template {slot} deleted"),
            FlowOutcome::DeleteFailed(slot) => write!(f, "deleting template {slot} failed"),
            FlowOutcome::Wiped => write!(f, "template library wiped"),
            FlowOutcome::WipeFailed => write!(f, "wiping template library failed"),
            FlowOutcome::LockedOut(mode) => write!(f, "{mode} locked out"),
            FlowOutcome::PasswordRejected(slot) => write!(f, "password rejected for user {slot}"),
        }
    }
}

/// The lock's foreground loop.
///
/// # Examples
///
/// ```
/// use vaultlock_controller::{FlowController, FlowOutcome, VirtualLcd};
/// use vaultlock_core::{KeyCode, LockConfig, SlotId, Timings};
/// use vaultlock_hardware::mock::{MockRelay, MockSensorLink};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = LockConfig { timings: Timings::instant(), ..LockConfig::default() };
/// let (link, sensor) = MockSensorLink::new();
/// let (relay, _relay) = MockRelay::new();
/// sensor.store_template(1, 42);
/// sensor.place_finger(42);
///
/// let mut controller = FlowController::new(&config, link, VirtualLcd::new(), relay);
/// let mut outcome = None;
/// for key in "B11234".chars() {
///     outcome = controller.handle_key(KeyCode::from_char(key).unwrap().into()).await;
/// }
/// assert_eq!(outcome, Some(FlowOutcome::AccessGranted(SlotId::new(1).unwrap())));
/// # }
/// ```
pub struct FlowController<L: SensorLink, D: StatusDisplay, R: LockActuator> {
    sensor: FingerprintSensor<L>,
    display: D,
    relay: R,
    credentials: CredentialTable,
    timings: Timings,
    max_attempts: u8,
    machine: StateMachine,
    flow: FlowState,
    state_tx: watch::Sender<LockState>,
    last_outcome: Option<FlowOutcome>,
}

impl<L: SensorLink, D: StatusDisplay, R: LockActuator> FlowController<L, D, R> {
    pub fn new(config: &LockConfig, link: L, display: D, relay: R) -> Self {
        let (state_tx, _) = watch::channel(LockState::Idle);
        Self {
            sensor: FingerprintSensor::new(link, &config.sensor, &config.timings),
            display,
            relay,
            credentials: config.credentials.clone(),
            timings: config.timings.clone(),
            max_attempts: config.max_attempts,
            machine: StateMachine::new(),
            flow: FlowState::new(),
            state_tx,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> LockState {
        *self.machine.current_state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn flow(&self) -> &FlowState {
        &self.flow
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn sensor(&self) -> &FingerprintSensor<L> {
        &self.sensor
    }

    pub fn last_outcome(&self) -> Option<FlowOutcome> {
        self.last_outcome
    }

    /// Follow the state of the flow from another task.
    ///
    /// The return to `Idle` is published after the closing messages, when
    /// the menu is back on the display.
    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state_tx.subscribe()
    }

    /// Power-up sequence: wait for the module to boot, handshake once and
    /// show the menu.
    ///
    /// A failed handshake is logged; the controller starts anyway.
    pub async fn startup(&mut self) {
        self.flow.reset();
        self.dwell(self.timings.sensor_boot()).await;

        match self.sensor.verify_password().await {
            Ok(ConfirmationCode::Success) => info!("sensor handshake succeeded"),
            Ok(code) => warn!(%code, "sensor rejected handshake"),
            Err(error) => warn!(%error, "sensor handshake failed"),
        }

        self.show(prompts::MENU).await;
    }

    /// Serve keys until every key sender is gone.
    ///
    /// Returns the number of sessions that reached a terminal outcome.
    pub async fn run(&mut self, keys: &mut KeyReceiver) -> usize {
        let mut completed = 0;
        while let Some(event) = keys.recv().await {
            if self.handle_key(event).await.is_some() {
                keys.drain();
                completed += 1;
            }
        }
        info!(completed, "key source closed, flow controller stopping");
        completed
    }

    /// Advance the flow by one key.
    ///
    /// Returns the outcome when the key completed a session.
    pub async fn handle_key(&mut self, event: KeyEvent) -> Option<FlowOutcome> {
        let code = event.code;
        if !code.is_valid() {
            debug!("dropping undecodable key");
            return None;
        }
        debug!(key = %code, state = %self.state(), "key received");

        match self.state() {
            LockState::Idle => self.select_mode(code).await,
            LockState::EnrollSelectSlot => {
                let slot = self.pick_slot(code, prompts::ENROLL_SLOT).await?;
                self.enter(LockState::BiometricCapture(BiometricAction::Enroll))
                    .ok()?;
                Some(self.enroll(slot).await)
            }
            LockState::DeleteSelectSlot => {
                let slot = self.pick_slot(code, prompts::DELETE_SLOT).await?;
                self.enter(LockState::BiometricCapture(BiometricAction::Delete))
                    .ok()?;
                Some(self.delete(slot).await)
            }
            LockState::VerifySelectUser => {
                self.pick_slot(code, prompts::VERIFY_USER).await?;
                self.enter(LockState::PasswordEntry).ok()?;
                self.show(prompts::ENTER_PASSWORD).await;
                None
            }
            LockState::PasswordEntry => self.password_key(code).await,
            state @ (LockState::BiometricCapture(_) | LockState::WipeConfirm) => {
                debug!(%state, "key ignored while the sensor is busy");
                None
            }
        }
    }

    async fn select_mode(&mut self, code: KeyCode) -> Option<FlowOutcome> {
        let (next, prompt) = match code {
            KeyCode::A => (LockState::EnrollSelectSlot, prompts::ENROLL_SLOT),
            KeyCode::B => (LockState::VerifySelectUser, prompts::VERIFY_USER),
            KeyCode::C => (LockState::DeleteSelectSlot, prompts::DELETE_SLOT),
            KeyCode::D => (LockState::WipeConfirm, prompts::WIPE),
            other => {
                info!(key = %other, "invalid key on main menu");
                self.show(prompts::INVALID_KEY).await;
                self.dwell(self.timings.invalid_key_dwell()).await;
                self.show(prompts::MENU).await;
                return None;
            }
        };

        self.enter(next).ok()?;
        self.flow.reset();
        self.flow.mode = next.mode();
        self.show(prompt).await;

        if next == LockState::WipeConfirm {
            return Some(self.wipe().await);
        }
        None
    }

    /// Accept a slot key, or re-prompt with `prompt`.
    async fn pick_slot(&mut self, code: KeyCode, prompt: Prompt) -> Option<SlotId> {
        let slot = match SlotId::from_key(code) {
            Ok(slot) => slot,
            Err(error) => {
                info!(key = %code, %error, "slot selection rejected");
                self.show(prompt).await;
                return None;
            }
        };

        info!(mode = %self.flow.mode, %slot, "slot selected");
        self.flow.user_slot = Some(slot);
        self.show_text(&two_lines("Selected slot", &slot.to_string()))
            .await;
        self.dwell(self.timings.prompt_dwell()).await;
        Some(slot)
    }

    async fn password_key(&mut self, code: KeyCode) -> Option<FlowOutcome> {
        if let Err(error) = self.flow.entered_password.push(code) {
            debug!(%error, "password key rejected");
            return None;
        }

        let entered = self.flow.entered_password.len();
        let mask = "*".repeat(entered);
        self.show_text(&two_lines(prompts::ENTER_PASSWORD.top, &mask))
            .await;
        if !self.flow.entered_password.is_complete() {
            return None;
        }

        let slot = self.flow.user_slot?;
        let accepted = self
            .credentials
            .password_for(slot)
            .is_some_and(|stored| self.flow.entered_password.matches(stored));
        self.flow.entered_password.clear();

        if !accepted {
            warn!(%slot, "password rejected");
            self.show(prompts::PASSWORD_WRONG).await;
            self.dwell(self.timings.prompt_dwell()).await;
            return Some(self.finish(FlowOutcome::PasswordRejected(slot)).await);
        }

        info!(%slot, "password accepted");
        self.show(prompts::PASSWORD_OK).await;
        self.dwell(self.timings.prompt_dwell()).await;
        self.enter(LockState::BiometricCapture(BiometricAction::Verify))
            .ok()?;
        Some(self.verify(slot).await)
    }

    async fn enroll(&mut self, slot: SlotId) -> FlowOutcome {
        self.announce_sensor_stage().await;
        self.show(prompts::PLACE_FINGER).await;
        self.dwell(self.timings.prompt_dwell()).await;

        self.flow.begin_attempts();
        loop {
            match self.enroll_attempt(slot).await {
                Ok(()) => {
                    info!(%slot, "fingerprint stored");
                    self.show(prompts::ENROLLED).await;
                    self.dwell(self.timings.result_dwell()).await;
                    return self.finish(FlowOutcome::Enrolled(slot)).await;
                }
                Err(error) => {
                    if self.attempt_failed(&error, prompts::STEP_ERROR).await {
                        return self.lock_out().await;
                    }
                }
            }
        }
    }

    /// Capture → template 1 → re-place → capture → template 2 → merge → store.
    async fn enroll_attempt(&mut self, slot: SlotId) -> Result<()> {
        self.sensor.capture_image().await?.into_result()?;
        self.sensor
            .image_to_template(CharBuffer::One)
            .await?
            .into_result()?;

        self.show(prompts::REPLACE_FINGER).await;
        self.dwell(self.timings.prompt_dwell()).await;

        self.sensor.capture_image().await?.into_result()?;
        self.sensor
            .image_to_template(CharBuffer::Two)
            .await?
            .into_result()?;
        self.sensor.create_model().await?.into_result()?;
        self.sensor.store_model(slot).await?.into_result()
    }

    async fn verify(&mut self, slot: SlotId) -> FlowOutcome {
        self.show(prompts::PLACE_FINGER).await;
        self.dwell(self.timings.prompt_dwell()).await;

        self.flow.begin_attempts();
        loop {
            match self.verify_attempt().await {
                Ok(found) => {
                    info!(
                        %slot,
                        page_id = found.page_id,
                        score = found.score,
                        "fingerprint matched"
                    );
                    self.pulse_relay().await;
                    return self.finish(FlowOutcome::AccessGranted(slot)).await;
                }
                Err(error) => {
                    let prompt = if is_no_match(&error) {
                        prompts::WRONG_FINGER
                    } else {
                        prompts::STEP_ERROR
                    };
                    if self.attempt_failed(&error, prompt).await {
                        return self.lock_out().await;
                    }
                }
            }
        }
    }

    /// Capture → template 1 → search.
    async fn verify_attempt(&mut self) -> Result<SearchMatch> {
        self.sensor.capture_image().await?.into_result()?;
        self.sensor
            .image_to_template(CharBuffer::One)
            .await?
            .into_result()?;

        let outcome = self.sensor.search_model().await?;
        outcome.code.into_result()?;
        outcome
            .found
            .ok_or_else(|| Error::InvalidFrame("search hit without a page id".into()))
    }

    async fn delete(&mut self, slot: SlotId) -> FlowOutcome {
        self.announce_sensor_stage().await;

        let outcome = match self.sensor.delete_model(slot).await {
            Ok(ConfirmationCode::Success) => {
                info!(%slot, "template deleted");
                self.show(prompts::DELETED).await;
                FlowOutcome::Deleted(slot)
            }
            result => {
                warn!(%slot, result = ?result, "template delete failed");
                self.show(prompts::DELETE_FAILED).await;
                FlowOutcome::DeleteFailed(slot)
            }
        };
        self.dwell(self.timings.result_dwell()).await;
        self.finish(outcome).await
    }

    async fn wipe(&mut self) -> FlowOutcome {
        self.dwell(self.timings.prompt_dwell()).await;

        let outcome = match self.sensor.empty_database().await {
            Ok(ConfirmationCode::Success) => {
                info!("template library wiped");
                self.show(prompts::WIPED).await;
                FlowOutcome::Wiped
            }
            result => {
                warn!(result = ?result, "template library wipe failed");
                self.show(prompts::WIPE_FAILED).await;
                FlowOutcome::WipeFailed
            }
        };
        self.dwell(self.timings.result_dwell()).await;
        self.finish(outcome).await
    }

    /// Record a failed biometric attempt; `true` once the budget is spent.
    async fn attempt_failed(&mut self, error: &Error, prompt: Prompt) -> bool {
        let exhausted = self.flow.record_failed_attempt(self.max_attempts);
        warn!(
            attempt = self.flow.retry_count,
            max_attempts = self.max_attempts,
            retryable = error.is_retryable(),
            %error,
            "biometric attempt failed"
        );
        self.show(prompt).await;
        self.dwell(self.timings.prompt_dwell()).await;
        exhausted
    }

    async fn lock_out(&mut self) -> FlowOutcome {
        let error = Error::RetryBudgetExhausted {
            attempts: self.flow.retry_count,
        };
        warn!(mode = %self.flow.mode, %error, "locked out");
        self.show(prompts::LOCKED_OUT).await;
        self.dwell(self.timings.result_dwell()).await;
        self.finish(FlowOutcome::LockedOut(self.flow.mode)).await
    }

    /// Engage the relay for the configured dwell.
    async fn pulse_relay(&mut self) {
        if let Err(error) = self.relay.engage().await {
            warn!(%error, "relay engage failed");
        }
        self.show(prompts::ACCESS_GRANTED).await;
        self.dwell(self.timings.relay_dwell()).await;
        if let Err(error) = self.relay.release().await {
            warn!(%error, "relay release failed");
        }
    }

    async fn announce_sensor_stage(&mut self) {
        self.show(prompts::TO_SENSOR).await;
        self.dwell(self.timings.prompt_dwell()).await;
    }

    /// Close the session: back to Idle with a fresh [`FlowState`].
    async fn finish(&mut self, outcome: FlowOutcome) -> FlowOutcome {
        let stage_ms = self.machine.time_in_current_state().as_millis() as u64;
        info!(%outcome, stage_ms, "flow finished");
        if let Err(error) = self.machine.transition_to(LockState::Idle) {
            warn!(%error, "session ended outside a terminal state, forcing Idle");
            self.machine.reset();
        }
        self.flow.reset();
        self.last_outcome = Some(outcome);

        self.show(prompts::READY).await;
        self.dwell(self.timings.ready_dwell()).await;
        self.show(prompts::MENU).await;
        // Subscribers see Idle once the menu accepts keys again.
        self.state_tx.send_replace(LockState::Idle);
        outcome
    }

    /// Move the machine to `next` and publish it.
    ///
    /// A refused transition leaves both the machine and subscribers
    /// untouched; callers stop the current step.
    fn enter(&mut self, next: LockState) -> Result<()> {
        let transition = self
            .machine
            .transition_to(next)
            .inspect_err(|error| warn!(%error, "state change refused"))?;
        info!(from = %transition.from, to = %transition.to, "state changed");
        self.state_tx.send_replace(next);
        Ok(())
    }

    async fn show(&mut self, prompt: Prompt) {
        self.show_text(&prompt.payload()).await;
    }

    async fn show_text(&mut self, payload: &str) {
        if let Err(error) = self.display.show(payload, true).await {
            warn!(%error, "display update failed");
        }
    }

    async fn dwell(&self, duration: Duration) {
        if !duration.is_zero() {
            sleep(duration).await;
        }
    }
}

fn is_no_match(error: &Error) -> bool {
    matches!(error, Error::SensorRejected { code, .. } if *code == ConfirmationCode::NoMatch.as_u8())
}
