//! Lock flows against the simulated keypad, fingerprint module and relay.
//!
//! Every test runs on a paused clock, so the pacing delays of the real lock
//! (prompt dwells, the relay pulse, the 10 s sensor timeout) cost nothing.

use std::future::Future;
use std::time::Duration;

use rstest::rstest;
use tokio::task::JoinHandle;

use vaultlock_controller::{
    BiometricAction, FlowController, FlowMode, FlowOutcome, LockState, VirtualLcd,
};
use vaultlock_core::{KeyCode, LockConfig, SlotId};
use vaultlock_hardware::{
    KeyReceiver, KeypadService, mailbox,
    mock::{
        MockKeypadHandle, MockKeypadMatrix, MockRelay, MockRelayHandle, MockSensorHandle,
        MockSensorLink, RelayEvent,
    },
};
use vaultlock_protocol::{ConfirmationCode, Instruction};

type Controller = FlowController<MockSensorLink, VirtualLcd, MockRelay>;

const HOLD: Duration = Duration::from_millis(40);
/// Longer than any prompt dwell, so no typed key is ever dropped.
const SETTLE: Duration = Duration::from_secs(3);

const FINGER: u32 = 42;
const STRANGER: u32 = 7;

struct Bench {
    controller: Controller,
    sensor: MockSensorHandle,
    relay: MockRelayHandle,
}

fn bench_with(config: LockConfig) -> Bench {
    let (link, sensor) = MockSensorLink::new();
    let (relay, relay_handle) = MockRelay::new();
    Bench {
        controller: FlowController::new(&config, link, VirtualLcd::new(), relay),
        sensor,
        relay: relay_handle,
    }
}

fn bench() -> Bench {
    bench_with(LockConfig::default())
}

fn slot(n: u8) -> SlotId {
    SlotId::new(n).unwrap()
}

fn keys(text: &str) -> Vec<KeyCode> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| KeyCode::from_char(c).unwrap())
        .collect()
}

/// Feed keys straight to the controller; returns the last outcome.
async fn press(controller: &mut Controller, text: &str) -> Option<FlowOutcome> {
    let mut outcome = None;
    for key in keys(text) {
        outcome = controller.handle_key(key.into()).await;
    }
    outcome
}

/// Keypad service plus the receiving end of its mailbox.
fn keypad() -> (MockKeypadHandle, KeyReceiver, JoinHandle<()>) {
    let (matrix, handle, edges) = MockKeypadMatrix::new();
    let (tx, rx) = mailbox();
    let service = KeypadService::new(matrix, edges, tx, &LockConfig::default().timings).spawn();
    (handle, rx, service)
}

/// Run the controller's foreground loop next to `script`, then stop the
/// keypad once the flow is back at the menu.
async fn run_session<F>(
    controller: &mut Controller,
    mut rx: KeyReceiver,
    service: JoinHandle<()>,
    script: F,
) -> usize
where
    F: Future<Output = ()>,
{
    let mut states = controller.subscribe();
    let script = async move {
        script.await;
        states.wait_for(LockState::is_idle).await.unwrap();
        service.abort();
    };
    let (completed, ()) = tokio::join!(controller.run(&mut rx), script);
    completed
}

// ============================================================================
// Password entry
// ============================================================================

#[rstest]
#[case(1, "1234")]
#[case(2, "4321")]
#[case(3, "0000")]
#[case(9, "6666")]
#[tokio::test(start_paused = true)]
async fn test_correct_password_reaches_verify_stage(#[case] user: u8, #[case] password: &str) {
    let mut bench = bench();

    press(&mut bench.controller, &format!("B{user}{password}")).await;

    let history = bench.controller.machine().history();
    assert!(history.iter().any(|t| {
        t.from == LockState::PasswordEntry
            && t.to == LockState::BiometricCapture(BiometricAction::Verify)
    }));
    assert_eq!(bench.sensor.count(Instruction::GetImage), 3);
}

#[rstest]
#[case("0234")]
#[case("1334")]
#[case("1244")]
#[case("1235")]
#[case("123A")]
#[tokio::test(start_paused = true)]
async fn test_single_deviation_rejects_password(#[case] password: &str) {
    let mut bench = bench();

    let outcome = press(&mut bench.controller, &format!("B1{password}")).await;

    assert_eq!(outcome, Some(FlowOutcome::PasswordRejected(slot(1))));
    assert_eq!(bench.controller.state(), LockState::Idle);
    assert_eq!(
        bench.controller.machine().last_transitions(1)[0].from,
        LockState::PasswordEntry
    );
    assert!(bench.controller.display().has_shown("Wrong password"));
    assert!(bench.sensor.commands().is_empty());
    assert_eq!(bench.relay.engage_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_letter_is_not_a_user_number() {
    let mut bench = bench();

    press(&mut bench.controller, "B").await;
    // Letters are not user numbers; the prompt repeats.
    press(&mut bench.controller, "A").await;
    assert_eq!(bench.controller.state(), LockState::VerifySelectUser);

    let outcome = press(&mut bench.controller, "5222").await;
    assert_eq!(outcome, None);
    assert_eq!(bench.controller.flow().entered_password.len(), 3);
}

// ============================================================================
// Enrollment
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_enrollment_stores_after_six_successful_steps() {
    let mut bench = bench();
    bench.sensor.place_finger(FINGER);

    let outcome = press(&mut bench.controller, "A3").await;

    assert_eq!(outcome, Some(FlowOutcome::Enrolled(slot(3))));
    assert_eq!(bench.sensor.template_at(3), Some(FINGER));
    let sequence: Vec<_> = bench
        .sensor
        .commands()
        .iter()
        .map(|command| command.instruction())
        .collect();
    assert_eq!(
        sequence,
        [
            Instruction::GetImage,
            Instruction::ImageToTemplate,
            Instruction::GetImage,
            Instruction::ImageToTemplate,
            Instruction::CreateModel,
            Instruction::Store,
        ]
    );
    assert!(bench.controller.display().has_shown("Remove and place again"));
    assert!(bench.controller.display().has_shown("Fingerprint stored"));
    assert!(bench.controller.state().is_idle());
}

#[rstest]
#[case(Instruction::GetImage, ConfirmationCode::NoFinger)]
#[case(Instruction::ImageToTemplate, ConfirmationCode::ImageTooDisordered)]
#[case(Instruction::CreateModel, ConfirmationCode::MergeFailed)]
#[case(Instruction::Store, ConfirmationCode::FlashWriteError)]
#[tokio::test(start_paused = true)]
async fn test_enrollment_failure_counts_attempt_without_storing(
    #[case] step: Instruction,
    #[case] code: ConfirmationCode,
) {
    let mut bench = bench_with(LockConfig {
        max_attempts: 1,
        ..LockConfig::default()
    });
    bench.sensor.place_finger(FINGER);
    bench.sensor.fail_next(step, code);

    let outcome = press(&mut bench.controller, "A4").await;

    assert_eq!(outcome, Some(FlowOutcome::LockedOut(FlowMode::Enroll)));
    assert!(bench.sensor.library().is_empty());
    assert!(bench.controller.display().has_shown("Locked out"));
}

#[tokio::test(start_paused = true)]
async fn test_enrollment_retries_from_capture() {
    let mut bench = bench();
    bench.sensor.place_finger(FINGER);
    bench
        .sensor
        .fail_next(Instruction::CreateModel, ConfirmationCode::MergeFailed);

    let outcome = press(&mut bench.controller, "A2").await;

    assert_eq!(outcome, Some(FlowOutcome::Enrolled(slot(2))));
    assert_eq!(bench.sensor.count(Instruction::GetImage), 4);
    assert_eq!(bench.sensor.count(Instruction::CreateModel), 2);
    assert_eq!(bench.sensor.count(Instruction::Store), 1);
    assert!(bench.controller.display().has_shown("Error. Remove and retry"));
}

#[tokio::test(start_paused = true)]
async fn test_enrollment_without_finger_locks_out_after_three_attempts() {
    let mut bench = bench();

    let outcome = press(&mut bench.controller, "A1").await;

    assert_eq!(outcome, Some(FlowOutcome::LockedOut(FlowMode::Enroll)));
    assert_eq!(bench.sensor.count(Instruction::GetImage), 3);
    assert_eq!(bench.sensor.count(Instruction::Store), 0);
    assert_eq!(bench.controller.flow().retry_count, 0);
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_three_failed_verifications_never_engage_relay() {
    let mut bench = bench();
    bench.sensor.store_template(1, FINGER);
    bench.sensor.place_finger(STRANGER);

    let outcome = press(&mut bench.controller, "B11234").await;

    assert_eq!(outcome, Some(FlowOutcome::LockedOut(FlowMode::Verify)));
    assert_eq!(bench.sensor.count(Instruction::Search), 3);
    assert_eq!(bench.relay.engage_count(), 0);
    assert!(bench.relay.events().is_empty());
    assert!(bench.controller.display().has_shown("Wrong finger"));
    assert!(bench.controller.display().has_shown("Max attempts Locked out"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_sensor_times_out_each_attempt() {
    let mut bench = bench();
    bench.sensor.set_silent(true);

    let start = tokio::time::Instant::now();
    let outcome = press(&mut bench.controller, "B11234").await;

    assert_eq!(outcome, Some(FlowOutcome::LockedOut(FlowMode::Verify)));
    assert_eq!(bench.sensor.count(Instruction::GetImage), 3);
    assert_eq!(bench.sensor.count(Instruction::ImageToTemplate), 0);
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(bench.relay.engage_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_attempt_can_still_open() {
    let mut bench = bench();
    bench.sensor.store_template(6, FINGER);
    bench.sensor.place_finger(FINGER);
    bench
        .sensor
        .fail_next(Instruction::Search, ConfirmationCode::NoMatch);

    let outcome = press(&mut bench.controller, "B41111").await;

    assert_eq!(outcome, Some(FlowOutcome::AccessGranted(slot(4))));
    assert_eq!(bench.sensor.count(Instruction::Search), 2);
    assert_eq!(bench.relay.engage_count(), 1);
}

// ============================================================================
// Delete and wipe
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_delete_removes_one_template() {
    let mut bench = bench();
    bench.sensor.store_template(5, FINGER);
    bench.sensor.store_template(6, STRANGER);

    let outcome = press(&mut bench.controller, "C5").await;

    assert_eq!(outcome, Some(FlowOutcome::Deleted(slot(5))));
    assert_eq!(bench.sensor.template_at(5), None);
    assert_eq!(bench.sensor.template_at(6), Some(STRANGER));
    assert_eq!(bench.sensor.count(Instruction::Delete), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_failure_is_reported_once() {
    let mut bench = bench();
    bench
        .sensor
        .fail_next(Instruction::Delete, ConfirmationCode::DeleteFailed);

    let outcome = press(&mut bench.controller, "C8").await;

    assert_eq!(outcome, Some(FlowOutcome::DeleteFailed(slot(8))));
    assert_eq!(bench.sensor.count(Instruction::Delete), 1);
    assert!(bench.controller.display().has_shown("Error deleting template"));
    assert!(bench.controller.state().is_idle());
}

// ============================================================================
// End to end through the keypad
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_e2e_verify_pulses_relay() {
    let mut bench = bench();
    bench.sensor.store_template(1, FINGER);
    bench.sensor.place_finger(FINGER);
    let (typist, rx, service) = keypad();

    let script = async move {
        typist
            .type_keys(&keys("B1 1234"), HOLD, SETTLE)
            .await
            .unwrap();
    };
    let completed = run_session(&mut bench.controller, rx, service, script).await;

    assert_eq!(completed, 1);
    assert_eq!(
        bench.controller.last_outcome(),
        Some(FlowOutcome::AccessGranted(slot(1)))
    );
    let events = bench.relay.events();
    assert!(matches!(
        events.as_slice(),
        [RelayEvent::Engaged(_), RelayEvent::Released(_)]
    ));
    assert!(events[1].at() - events[0].at() >= Duration::from_secs(4));
    assert!(!bench.relay.is_engaged());
    assert!(bench.controller.display().has_shown("Access granted"));
    assert!(bench.controller.state().is_idle());
}

#[rstest]
#[case(None, FlowOutcome::Wiped)]
#[case(Some(ConfirmationCode::ClearFailed), FlowOutcome::WipeFailed)]
#[tokio::test(start_paused = true)]
async fn test_e2e_wipe_sends_exactly_one_empty(
    #[case] failure: Option<ConfirmationCode>,
    #[case] expected: FlowOutcome,
) {
    let mut bench = bench();
    bench.sensor.store_template(1, FINGER);
    if let Some(code) = failure {
        bench.sensor.fail_next(Instruction::Empty, code);
    }
    let (typist, rx, service) = keypad();

    let script = async move {
        typist.type_keys(&keys("D"), HOLD, SETTLE).await.unwrap();
    };
    let completed = run_session(&mut bench.controller, rx, service, script).await;

    assert_eq!(completed, 1);
    assert_eq!(bench.controller.last_outcome(), Some(expected));
    assert_eq!(bench.sensor.commands().len(), 1);
    assert_eq!(bench.sensor.count(Instruction::Empty), 1);
    assert!(bench.controller.state().is_idle());
    assert!(bench.controller.display().has_shown("Safe available"));
}

#[tokio::test(start_paused = true)]
async fn test_e2e_keys_pressed_during_biometric_stage_are_discarded() {
    let mut bench = bench();
    let (typist, rx, service) = keypad();

    let script = async move {
        typist
            .type_keys(&keys("D A"), HOLD, Duration::from_millis(400))
            .await
            .unwrap();
    };
    let completed = run_session(&mut bench.controller, rx, service, script).await;

    assert_eq!(completed, 1);
    let states: Vec<_> = bench
        .controller
        .machine()
        .history()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(states, [LockState::WipeConfirm, LockState::Idle]);
}
