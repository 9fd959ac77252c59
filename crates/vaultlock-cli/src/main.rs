//! vaultlock - run the lock flow against simulated hardware
//!
//! Types a scripted key sequence on a simulated 4×4 keypad and runs the
//! flow controller against a simulated fingerprint module, relay and 16×2
//! LCD, printing the display every time it changes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultlock_controller::{FlowController, LcdFrame, LockState, VirtualLcd};
use vaultlock_core::{KeyCode, LockConfig};
use vaultlock_hardware::{
    KeypadService, mailbox,
    mock::{MockKeypadHandle, MockKeypadMatrix, MockRelay, MockSensorLink},
};

/// Finger registered in the simulated module's library.
const ENROLLED_FINGER: u32 = 1;
/// Finger the module has never seen.
const UNKNOWN_FINGER: u32 = 2;

const HOLD: Duration = Duration::from_millis(40);
/// Extra wait after each key on top of the longest prompt dwell.
const KEY_MARGIN: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "vaultlock")]
#[command(about = "Dual-factor lock flow controller on simulated hardware", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file (defaults to $VAULTLOCK_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keys to type on the keypad, e.g. "B1 1234" (spaces are ignored)
    #[arg(short, long)]
    keys: String,

    /// Finger presented to the fingerprint module
    #[arg(short, long, value_enum, default_value_t = Finger::Enrolled)]
    finger: Finger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Finger {
    /// The finger stored at slot 1
    Enrolled,
    /// A finger with no stored template
    Unknown,
    /// Nothing on the glass
    None,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultlock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let script = parse_keys(&cli.keys)?;

    info!("Starting vaultlock v{}", env!("CARGO_PKG_VERSION"));

    let (link, sensor) = MockSensorLink::with_password(config.sensor.password);
    sensor.store_template(1, ENROLLED_FINGER);
    match cli.finger {
        Finger::Enrolled => sensor.place_finger(ENROLLED_FINGER),
        Finger::Unknown => sensor.place_finger(UNKNOWN_FINGER),
        Finger::None => sensor.lift_finger(),
    }
    let (relay, relay_events) = MockRelay::new();
    let lcd = VirtualLcd::new();
    let frames = lcd.subscribe();

    let (matrix, keypad, edges) = MockKeypadMatrix::new();
    let (key_tx, mut key_rx) = mailbox();
    let service = KeypadService::new(matrix, edges, key_tx, &config.timings).spawn();

    let mut controller = FlowController::new(&config, link, lcd, relay);
    let states = controller.subscribe();

    let foreground = async move {
        controller.startup().await;
        let completed = controller.run(&mut key_rx).await;
        (completed, controller.last_outcome())
    };
    let typist = async move {
        let typed = type_script(&keypad, &script, &config, states).await;
        // Stopping the keypad closes the mailbox and ends the foreground loop.
        service.abort();
        typed
    };

    let ((completed, last_outcome), typed, ()) =
        tokio::join!(foreground, typist, print_frames(frames));
    typed?;

    println!("sessions completed: {completed}");
    if let Some(outcome) = last_outcome {
        println!("last outcome: {outcome}");
    }
    println!("relay actuations: {}", relay_events.engage_count());

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<LockConfig> {
    let path = path.or_else(|| std::env::var_os("VAULTLOCK_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => LockConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(LockConfig::default()),
    }
}

fn parse_keys(text: &str) -> Result<Vec<KeyCode>> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| KeyCode::from_char(c).with_context(|| format!("'{c}' is not a keypad key")))
        .collect()
}

/// Type each key once the controller can take it.
async fn type_script(
    keypad: &MockKeypadHandle,
    script: &[KeyCode],
    config: &LockConfig,
    mut states: watch::Receiver<LockState>,
) -> Result<()> {
    let timings = &config.timings;
    let gap = timings.prompt_dwell().max(timings.invalid_key_dwell()) + KEY_MARGIN;

    tokio::time::sleep(timings.sensor_boot() + KEY_MARGIN).await;
    for key in script {
        states.wait_for(|state| !state.is_biometric()).await?;
        keypad.tap(*key, HOLD).await?;
        tokio::time::sleep(gap).await;
    }
    states.wait_for(|state| !state.is_biometric()).await?;
    Ok(())
}

async fn print_frames(mut frames: watch::Receiver<LcdFrame>) {
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        println!("{frame}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys_ignores_spaces() {
        let keys = parse_keys("B1 1234").unwrap();
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], KeyCode::B);
        assert_eq!(keys[5], KeyCode::Digit(4));
    }

    #[test]
    fn test_parse_keys_rejects_unknown_characters() {
        assert!(parse_keys("B1#").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["vaultlock", "--keys", "D"]).unwrap();
        assert_eq!(cli.finger, Finger::Enrolled);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_finger_choice() {
        let cli = Cli::try_parse_from(["vaultlock", "-k", "B11234", "--finger", "unknown"]).unwrap();
        assert_eq!(cli.finger, Finger::Unknown);
    }
}
