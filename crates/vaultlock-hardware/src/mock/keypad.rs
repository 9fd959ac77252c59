//! Simulated 4×4 keypad matrix.
//!
//! The matrix behaves like the wired keypad: a held key connects its row to
//! its column, so the column line goes high only while the strobe drives
//! that key's row. Each low-to-high transition of the column is reported as
//! a [`ColumnEdge`].

use crate::{
    HardwareError, Result,
    keypad::{ColumnEdge, KEY_LAYOUT, column_bit, row_bit},
    traits::KeypadLines,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::mpsc;
use vaultlock_core::KeyCode;

#[derive(Debug, Default)]
struct MatrixState {
    driven_row: Option<u8>,
    pressed: Option<(u8, u8)>,
}

impl MatrixState {
    fn column_high(&self) -> bool {
        matches!((self.driven_row, self.pressed), (Some(row), Some((pressed, _))) if row == pressed)
    }
}

fn lock(state: &Mutex<MatrixState>) -> MutexGuard<'_, MatrixState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keypad lines backed by a simulated matrix.
///
/// # Examples
///
/// ```
/// use vaultlock_hardware::mock::MockKeypadMatrix;
/// use vaultlock_hardware::traits::KeypadLines;
/// use vaultlock_core::KeyCode;
///
/// let (mut matrix, handle, mut edges) = MockKeypadMatrix::new();
/// handle.press(KeyCode::Digit(5)).unwrap();
///
/// matrix.drive_row(1);
/// assert!(edges.try_recv().is_ok());
/// assert_eq!(matrix.snapshot(), 0x44);
/// ```
#[derive(Debug)]
pub struct MockKeypadMatrix {
    state: Arc<Mutex<MatrixState>>,
    edges: mpsc::UnboundedSender<ColumnEdge>,
}

impl MockKeypadMatrix {
    /// Create the matrix, a handle for pressing keys and the edge source.
    pub fn new() -> (Self, MockKeypadHandle, mpsc::UnboundedReceiver<ColumnEdge>) {
        let state = Arc::new(Mutex::new(MatrixState::default()));
        let (edges, edge_rx) = mpsc::unbounded_channel();

        let matrix = Self {
            state: Arc::clone(&state),
            edges: edges.clone(),
        };
        let handle = MockKeypadHandle { state, edges };

        (matrix, handle, edge_rx)
    }
}

impl KeypadLines for MockKeypadMatrix {
    fn drive_row(&mut self, row: u8) {
        let mut state = lock(&self.state);
        let was_high = state.column_high();
        state.driven_row = Some(row);
        if !was_high && state.column_high() {
            let _ = self.edges.send(ColumnEdge);
        }
    }

    fn snapshot(&self) -> u8 {
        let state = lock(&self.state);
        let rows = state.driven_row.map_or(0, row_bit);
        let columns = match state.pressed {
            Some((_, column)) if state.column_high() => column_bit(column),
            _ => 0,
        };
        rows | columns
    }
}

/// Handle for pressing keys on a [`MockKeypadMatrix`].
#[derive(Debug, Clone)]
pub struct MockKeypadHandle {
    state: Arc<Mutex<MatrixState>>,
    edges: mpsc::UnboundedSender<ColumnEdge>,
}

impl MockKeypadHandle {
    /// Hold a key down.
    ///
    /// # Errors
    /// Returns `HardwareError::InvalidData` for `KeyCode::Invalid`.
    pub fn press(&self, key: KeyCode) -> Result<()> {
        let position = KEY_LAYOUT
            .iter()
            .enumerate()
            .find_map(|(row, keys)| {
                keys.iter()
                    .position(|k| *k == key)
                    .map(|column| (row as u8, column as u8))
            })
            .ok_or_else(|| HardwareError::invalid_data(format!("no key {key} on the matrix")))?;

        let mut state = lock(&self.state);
        let was_high = state.column_high();
        state.pressed = Some(position);
        if !was_high && state.column_high() {
            self.edges
                .send(ColumnEdge)
                .map_err(|_| HardwareError::disconnected("keypad edge source"))?;
        }
        Ok(())
    }

    /// Let go of the held key.
    pub fn release(&self) {
        lock(&self.state).pressed = None;
    }

    /// Press a key, hold it for `hold`, release it.
    pub async fn tap(&self, key: KeyCode, hold: Duration) -> Result<()> {
        self.press(key)?;
        tokio::time::sleep(hold).await;
        self.release();
        Ok(())
    }

    /// Tap each key in turn, waiting `gap` after every release.
    pub async fn type_keys(&self, keys: &[KeyCode], hold: Duration, gap: Duration) -> Result<()> {
        for key in keys {
            self.tap(*key, hold).await?;
            tokio::time::sleep(gap).await;
        }
        Ok(())
    }

    pub fn is_pressed(&self) -> bool {
        lock(&self.state).pressed.is_some()
    }
}
