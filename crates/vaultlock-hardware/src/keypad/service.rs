use crate::{
    keypad::{KeySender, KeypadScanner},
    traits::KeypadLines,
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};
use vaultlock_core::Timings;

/// Rising edge on one of the column lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnEdge;

/// Task that owns the keypad scanner.
///
/// Stands in for the interrupt handlers of the device: it reacts to the row
/// tick, the debounce tick and column edge notifications, and posts each
/// captured snapshot to the key mailbox. Edges are served first, the way an
/// edge interrupt preempts the timers.
pub struct KeypadService<L: KeypadLines> {
    lines: L,
    edges: mpsc::UnboundedReceiver<ColumnEdge>,
    keys: KeySender,
    scanner: KeypadScanner,
    row_tick: Duration,
    debounce_tick: Duration,
}

impl<L: KeypadLines + 'static> KeypadService<L> {
    pub fn new(
        lines: L,
        edges: mpsc::UnboundedReceiver<ColumnEdge>,
        keys: KeySender,
        timings: &Timings,
    ) -> Self {
        Self {
            lines,
            edges,
            keys,
            scanner: KeypadScanner::new(),
            row_tick: timings.row_tick(),
            debounce_tick: timings.debounce_tick(),
        }
    }

    /// Run the service on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve interrupts until the key receiver or the edge source goes away.
    pub async fn run(mut self) {
        let mut row_tick = time::interval(self.row_tick);
        row_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut debounce_tick = time::interval(self.debounce_tick);
        debounce_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            row_tick_ms = self.row_tick.as_millis() as u64,
            debounce_tick_ms = self.debounce_tick.as_millis() as u64,
            "keypad service started"
        );

        loop {
            tokio::select! {
                biased;

                edge = self.edges.recv() => {
                    if edge.is_none() {
                        debug!("column edge source closed");
                        break;
                    }
                    let Some(snapshot) = self.scanner.on_column_edge(&self.lines) else {
                        continue;
                    };
                    debounce_tick.reset();
                    if self.keys.post(snapshot).is_err() {
                        debug!("key receiver dropped");
                        break;
                    }
                }

                _ = debounce_tick.tick(), if self.scanner.is_debouncing() => {
                    if self.scanner.on_debounce_tick(&self.lines) {
                        row_tick.reset();
                    }
                }

                _ = row_tick.tick(), if self.scanner.is_scanning() => {
                    self.scanner.on_row_tick(&mut self.lines);
                }
            }
        }

        info!("keypad service stopped");
    }
}
