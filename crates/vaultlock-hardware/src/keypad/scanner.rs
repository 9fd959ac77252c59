use crate::traits::KeypadLines;
use tracing::trace;
use vaultlock_core::constants::{COLUMN_MASK, KEYPAD_ROWS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebouncePhase {
    /// Record whether the columns are clear.
    Sample,
    /// Commit a release if this sample and the previous one are clear.
    Confirm,
}

/// Two-phase release filter for the column lines.
///
/// Armed after a capture. Each tick alternates between recording a sample
/// and confirming it; the release is committed only when two consecutive
/// samples read all columns low. A dirty sample starts the cycle again, so
/// a held key keeps the filter armed indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceFilter {
    armed: bool,
    phase: DebouncePhase,
    first_clear: bool,
}

impl DebounceFilter {
    pub fn new() -> Self {
        Self {
            armed: false,
            phase: DebouncePhase::Sample,
            first_clear: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self) {
        self.armed = true;
        self.phase = DebouncePhase::Sample;
        self.first_clear = false;
    }

    /// Feed one column sample; returns `true` when the release is committed.
    pub fn sample(&mut self, columns: u8) -> bool {
        if !self.armed {
            return false;
        }

        let clear = columns & COLUMN_MASK == 0;
        match self.phase {
            DebouncePhase::Sample => {
                self.first_clear = clear;
                self.phase = DebouncePhase::Confirm;
                false
            }
            DebouncePhase::Confirm if clear && self.first_clear => {
                self.armed = false;
                self.phase = DebouncePhase::Sample;
                true
            }
            DebouncePhase::Confirm => {
                self.phase = DebouncePhase::Sample;
                false
            }
        }
    }
}

impl Default for DebounceFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Row strobe and edge capture for the matrix keypad.
///
/// Holds the line state the interrupt handlers would own on the device:
/// the current row, whether the row tick and column edge interrupts are
/// enabled, and the debounce filter. At most one key is in flight; after a
/// capture the strobe and edge sources stay disabled until the debounce
/// filter commits the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypadScanner {
    row: u8,
    scanning: bool,
    edges_enabled: bool,
    debounce: DebounceFilter,
}

impl KeypadScanner {
    pub fn new() -> Self {
        Self {
            row: 0,
            scanning: true,
            edges_enabled: true,
            debounce: DebounceFilter::new(),
        }
    }

    /// Row currently driven high.
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Whether the row tick is enabled.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Whether column edge interrupts are enabled.
    pub fn edges_enabled(&self) -> bool {
        self.edges_enabled
    }

    /// Whether the debounce tick is enabled.
    pub fn is_debouncing(&self) -> bool {
        self.debounce.is_armed()
    }

    /// Advance the strobe to the next row.
    pub fn on_row_tick<L: KeypadLines>(&mut self, lines: &mut L) {
        if !self.scanning {
            return;
        }
        self.row = (self.row + 1) % KEYPAD_ROWS;
        lines.drive_row(self.row);
    }

    /// Handle a rising edge on a column line.
    ///
    /// Returns the captured row/column snapshot, or `None` while edge
    /// interrupts are disabled.
    pub fn on_column_edge<L: KeypadLines>(&mut self, lines: &L) -> Option<u8> {
        if !self.edges_enabled {
            return None;
        }

        let snapshot = lines.snapshot();
        self.scanning = false;
        self.edges_enabled = false;
        self.debounce.arm();
        trace!(row = self.row, "key captured, snapshot {snapshot:#04X}");
        Some(snapshot)
    }

    /// Sample the columns on the debounce tick.
    ///
    /// Returns `true` when the key has been released and scanning resumed.
    pub fn on_debounce_tick<L: KeypadLines>(&mut self, lines: &L) -> bool {
        if !self.debounce.sample(lines.snapshot()) {
            return false;
        }
        self.scanning = true;
        self.edges_enabled = true;
        trace!("key released, scanning resumed");
        true
    }
}

impl Default for KeypadScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lines whose snapshot is fully under test control.
    #[derive(Default)]
    struct Lines {
        driven: Vec<u8>,
        snapshot: u8,
    }

    impl KeypadLines for Lines {
        fn drive_row(&mut self, row: u8) {
            self.driven.push(row);
        }

        fn snapshot(&self) -> u8 {
            self.snapshot
        }
    }

    #[test]
    fn test_row_strobe_rotates() {
        let mut scanner = KeypadScanner::new();
        let mut lines = Lines::default();
        for _ in 0..6 {
            scanner.on_row_tick(&mut lines);
        }
        assert_eq!(lines.driven, vec![1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn test_capture_freezes_scanner() {
        let mut scanner = KeypadScanner::new();
        let mut lines = Lines {
            snapshot: 0x48,
            ..Default::default()
        };

        assert_eq!(scanner.on_column_edge(&lines), Some(0x48));
        assert!(!scanner.is_scanning());
        assert!(!scanner.edges_enabled());
        assert!(scanner.is_debouncing());

        // A second edge while frozen is ignored.
        assert_eq!(scanner.on_column_edge(&lines), None);

        scanner.on_row_tick(&mut lines);
        assert!(lines.driven.is_empty());
    }

    #[test]
    fn test_release_needs_two_clean_samples() {
        let mut scanner = KeypadScanner::new();
        let mut lines = Lines {
            snapshot: 0x88,
            ..Default::default()
        };
        scanner.on_column_edge(&lines);

        // Key still held.
        assert!(!scanner.on_debounce_tick(&lines));
        assert!(!scanner.on_debounce_tick(&lines));

        // Bounce: clear then dirty.
        lines.snapshot = 0x08;
        assert!(!scanner.on_debounce_tick(&lines));
        lines.snapshot = 0x88;
        assert!(!scanner.on_debounce_tick(&lines));
        assert!(scanner.is_debouncing());

        lines.snapshot = 0x08;
        assert!(!scanner.on_debounce_tick(&lines));
        assert!(scanner.on_debounce_tick(&lines));
        assert!(scanner.is_scanning());
        assert!(scanner.edges_enabled());
        assert!(!scanner.is_debouncing());
    }

    #[test]
    fn test_dirty_first_sample_blocks_release() {
        let mut filter = DebounceFilter::new();
        filter.arm();
        assert!(!filter.sample(0x40));
        assert!(!filter.sample(0x00));
        assert!(!filter.sample(0x00));
        assert!(filter.sample(0x00));
    }

    #[test]
    fn test_disarmed_filter_ignores_samples() {
        let mut filter = DebounceFilter::default();
        assert!(!filter.sample(0x00));
        assert!(!filter.sample(0x00));
    }
}
