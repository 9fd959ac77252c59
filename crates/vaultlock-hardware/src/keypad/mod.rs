//! Keypad scanning engine.
//!
//! The pieces run leaves first:
//!
//! - [`KeypadScanner`] strobes one row at a time and captures the row/column
//!   snapshot on a rising column edge, freezing itself until the key is
//!   released.
//! - [`DebounceFilter`] samples the column lines on a slower tick and
//!   re-arms the scanner after two clean samples.
//! - The [`mailbox`] carries at most one captured snapshot to the foreground.
//! - [`decode`] turns the snapshot into a [`KeyCode`](vaultlock_core::KeyCode).
//! - [`KeypadService`] is the tokio task that owns the scanner and drives it
//!   from the tick intervals and edge notifications.

pub mod decoder;
pub mod mailbox;
pub mod scanner;
pub mod service;

pub use decoder::{KEY_LAYOUT, column_bit, decode, mask_of, row_bit};
pub use mailbox::{KeyReceiver, KeySender, mailbox};
pub use scanner::{DebounceFilter, KeypadScanner};
pub use service::{ColumnEdge, KeypadService};
