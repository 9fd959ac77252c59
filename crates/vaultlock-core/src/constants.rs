//! Core constants for the vaultlock flow controller.
//!
//! This module centralizes the fixed values shared by the keypad engine, the
//! fingerprint sensor driver and the flow controller: wire-level framing
//! bytes, keypad geometry, credential limits and the default pacing delays
//! of the reference firmware.
//!
//! # Sensor Frame Layout
//!
//! ```text
//! EF 01 | FF FF FF FF | 01  | LL LL  | II   | payload ... | CC CC
//! header  address       pid   length   instr               checksum
//! ```
//!
//! All multi-byte fields are big-endian. The length counts the instruction,
//! the payload and the two checksum bytes.
//!
//! # Usage
//!
//! ```
//! use vaultlock_core::constants::*;
//!
//! assert_eq!(FRAME_HEADER, [0xEF, 0x01]);
//! assert_eq!(KEYPAD_ROWS * KEYPAD_COLUMNS, 16);
//!
//! use std::time::Duration;
//! let timeout = Duration::from_millis(DEFAULT_SENSOR_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 10);
//! ```

// ============================================================================
// Sensor Wire Protocol
// ============================================================================

/// Start-of-packet marker for every sensor frame.
pub const FRAME_HEADER: [u8; 2] = [0xEF, 0x01];

/// Broadcast device address used by factory-configured sensors.
pub const BROADCAST_ADDRESS: u32 = 0xFFFF_FFFF;

/// Packet identifier for command packets sent by the host.
pub const PID_COMMAND: u8 = 0x01;

/// Packet identifier for acknowledge packets returned by the sensor.
pub const PID_ACK: u8 = 0x07;

/// Bytes preceding the length field: header, address and packet identifier.
pub const FRAME_PREFIX_LEN: usize = 7;

/// Bytes preceding the instruction or confirmation byte.
///
/// Header (2) + address (4) + packet identifier (1) + length (2).
pub const FRAME_HEADER_LEN: usize = 9;

/// Size of the trailing checksum field.
pub const CHECKSUM_LEN: usize = 2;

/// Offset of the confirmation code inside an acknowledge packet.
pub const CONFIRMATION_OFFSET: usize = 9;

/// Length of a plain acknowledge packet (confirmation code only).
pub const ACK_RESPONSE_LEN: usize = 12;

/// Length of the acknowledge packet returned by the search command.
///
/// Adds the matched page id (2 bytes) and the match score (2 bytes).
pub const SEARCH_RESPONSE_LEN: usize = 16;

/// Upper bound for any frame the driver is willing to buffer.
pub const MAX_FRAME_LEN: usize = 64;

/// Serial line speed of the fingerprint module.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Handshake password configured in the sensor at the factory.
pub const DEFAULT_SENSOR_PASSWORD: u32 = 0x0000_0000;

/// First template page searched by the search command.
pub const SEARCH_START_PAGE: u16 = 0x0000;

/// Number of template pages searched by the search command.
pub const SEARCH_PAGE_COUNT: u16 = 0x0064;

// ============================================================================
// Keypad Geometry
// ============================================================================

/// Number of strobed row lines.
pub const KEYPAD_ROWS: u8 = 4;

/// Number of sensed column lines.
pub const KEYPAD_COLUMNS: u8 = 4;

/// Bits of the captured snapshot that carry the column lines.
pub const COLUMN_MASK: u8 = 0xF0;

// ============================================================================
// Credentials and Retry Policy
// ============================================================================

/// Lowest selectable user/template slot.
pub const MIN_SLOT: u8 = 1;

/// Highest selectable user/template slot.
pub const MAX_SLOT: u8 = 9;

/// Number of keys in a password.
pub const PASSWORD_LENGTH: usize = 4;

/// Maximum biometric attempts per stage before lockout.
pub const MAX_ATTEMPTS: u8 = 3;

// ============================================================================
// Display
// ============================================================================

/// Characters per LCD line.
pub const LCD_COLUMNS: usize = 16;

/// Number of LCD lines.
pub const LCD_LINES: usize = 2;

/// Width of a full display payload (both lines).
pub const DISPLAY_PAYLOAD_WIDTH: usize = LCD_COLUMNS * LCD_LINES;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// Row strobe period.
pub const DEFAULT_ROW_TICK_MS: u64 = 2;

/// Debounce sampling period.
pub const DEFAULT_DEBOUNCE_TICK_MS: u64 = 100;

/// Hard ceiling for one sensor response.
pub const DEFAULT_SENSOR_TIMEOUT_MS: u64 = 10_000;

/// Pause between polls of the sensor receive line.
pub const DEFAULT_SENSOR_POLL_MS: u64 = 10;

/// Power-up delay before the sensor accepts commands.
pub const DEFAULT_SENSOR_BOOT_MS: u64 = 5_000;

/// Dwell for prompts such as "place finger".
pub const DEFAULT_PROMPT_DWELL_MS: u64 = 2_500;

/// Dwell for terminal result messages.
pub const DEFAULT_RESULT_DWELL_MS: u64 = 4_000;

/// Time the relay stays engaged after a successful verification.
pub const DEFAULT_RELAY_DWELL_MS: u64 = 4_000;

/// Dwell for the invalid-key message on the main menu.
pub const DEFAULT_INVALID_KEY_DWELL_MS: u64 = 2_000;

/// Dwell for the "safe available" banner after a flow ends.
pub const DEFAULT_READY_DWELL_MS: u64 = 2_000;
