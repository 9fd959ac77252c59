//! Virtual 16×2 character LCD.
//!
//! Renders the payloads sent through [`StatusDisplay`] the way the I2C
//! module on the lock does: 32 characters, 16 per line, left-aligned, with
//! the payload flowing onto the second line when wrapping is requested.
//!
//! # Character Encoding - ASCII Only
//!
//! The LCD controller has no extended character set. Non-ASCII payloads are
//! rejected with [`HardwareError::InvalidData`] and control characters are
//! stripped.
//!
//! # Examples
//!
//! ```
//! use vaultlock_controller::VirtualLcd;
//! use vaultlock_hardware::StatusDisplay;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> vaultlock_hardware::Result<()> {
//! let mut lcd = VirtualLcd::new();
//! lcd.show("Place your      finger", true).await?;
//!
//! assert_eq!(lcd.frame().line(0), Some("Place your      "));
//! assert_eq!(lcd.frame().line(1), Some("finger          "));
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::watch;
use tracing::debug;

use vaultlock_core::constants::{DISPLAY_PAYLOAD_WIDTH, LCD_COLUMNS, LCD_LINES};
use vaultlock_hardware::{HardwareError, Result, StatusDisplay};

/// Number of shown messages kept for inspection.
const MAX_MESSAGES: usize = 100;

/// Contents of both LCD lines, always padded to the full width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdFrame {
    lines: [String; LCD_LINES],
}

impl LcdFrame {
    pub fn blank() -> Self {
        Self {
            lines: std::array::from_fn(|_| " ".repeat(LCD_COLUMNS)),
        }
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String; LCD_LINES] {
        &self.lines
    }

    /// Both lines trimmed and joined with a space.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for LcdFrame {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Display for LcdFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = "-".repeat(LCD_COLUMNS);
        writeln!(f, "+{border}+")?;
        for line in &self.lines {
            writeln!(f, "|{line}|")?;
        }
        write!(f, "+{border}+")
    }
}

/// Host-side stand-in for the 16×2 LCD.
///
/// Keeps the current frame, a bounded log of the messages shown, and
/// publishes every new frame to subscribers.
#[derive(Debug)]
pub struct VirtualLcd {
    frame: LcdFrame,
    messages: VecDeque<String>,
    frames: watch::Sender<LcdFrame>,
}

impl VirtualLcd {
    pub fn new() -> Self {
        let (frames, _) = watch::channel(LcdFrame::blank());
        Self {
            frame: LcdFrame::blank(),
            messages: VecDeque::with_capacity(MAX_MESSAGES),
            frames,
        }
    }

    /// Receive every frame the display renders from now on.
    pub fn subscribe(&self) -> watch::Receiver<LcdFrame> {
        self.frames.subscribe()
    }

    pub fn frame(&self) -> &LcdFrame {
        &self.frame
    }

    /// Messages shown so far, oldest first, as [`LcdFrame::text`].
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    /// Whether any message shown so far contains `needle`.
    pub fn has_shown(&self, needle: &str) -> bool {
        self.messages.iter().any(|message| message.contains(needle))
    }

    fn publish(&mut self) {
        let text = self.frame.text();
        debug!(lcd = %text, "display updated");
        self.messages.push_back(text);
        if self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.frames.send_replace(self.frame.clone());
    }
}

impl Default for VirtualLcd {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDisplay for VirtualLcd {
    async fn show(&mut self, payload: &str, wrap: bool) -> Result<()> {
        let payload = truncate_text(&sanitize_text(payload)?, DISPLAY_PAYLOAD_WIDTH);

        if wrap {
            let split = payload.len().min(LCD_COLUMNS);
            let (top, bottom) = payload.split_at(split);
            self.frame.lines[0] = pad_line(top);
            self.frame.lines[1] = pad_line(bottom);
        } else {
            self.frame.lines[0] = pad_line(&payload);
        }

        self.publish();
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.frame = LcdFrame::blank();
        self.frames.send_replace(self.frame.clone());
        Ok(())
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Fit text to one LCD line: cut at the line width, pad with spaces.
fn pad_line(text: &str) -> String {
    format!("{:<width$}", truncate_text(text, LCD_COLUMNS), width = LCD_COLUMNS)
}

fn sanitize_text(text: &str) -> Result<String> {
    if !text.is_ascii() {
        return Err(HardwareError::invalid_data(format!(
            "display text must be ASCII: {text:?}"
        )));
    }
    Ok(text.chars().filter(|c| !c.is_ascii_control()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_wrap_splits_payload_over_both_lines() {
        let mut lcd = VirtualLcd::new();
        lcd.show("A:Enroll B:Open C:Delete D:Wipe", true)
            .await
            .unwrap();

        assert_eq!(lcd.frame().line(0), Some("A:Enroll B:Open "));
        assert_eq!(lcd.frame().line(1), Some("C:Delete D:Wipe "));
    }

    #[tokio::test]
    async fn test_without_wrap_only_first_line_changes() {
        let mut lcd = VirtualLcd::new();
        lcd.show("Place your      finger", true).await.unwrap();
        lcd.show("Access granted and more", false).await.unwrap();

        assert_eq!(lcd.frame().line(0), Some("Access granted a"));
        assert_eq!(lcd.frame().line(1), Some("finger          "));
    }

    #[tokio::test]
    async fn test_long_payload_is_truncated() {
        let mut lcd = VirtualLcd::new();
        lcd.show(&"x".repeat(40), true).await.unwrap();

        assert_eq!(lcd.frame().line(0).unwrap().len(), LCD_COLUMNS);
        assert_eq!(lcd.frame().line(1), Some("xxxxxxxxxxxxxxxx"));
    }

    #[tokio::test]
    async fn test_non_ascii_is_rejected() {
        let mut lcd = VirtualLcd::new();
        let result = lcd.show("Contraseña", true).await;

        assert!(matches!(result, Err(HardwareError::InvalidData { .. })));
        assert_eq!(lcd.frame(), &LcdFrame::blank());
        assert_eq!(lcd.messages().count(), 0);
    }

    #[tokio::test]
    async fn test_control_characters_are_stripped() {
        let mut lcd = VirtualLcd::new();
        lcd.show("Safe\navailable", true).await.unwrap();
        assert_eq!(lcd.frame().text(), "Safeavailable");
    }

    #[tokio::test]
    async fn test_subscribers_see_every_frame() {
        let mut lcd = VirtualLcd::new();
        let mut frames = lcd.subscribe();

        lcd.show("Wrong password", true).await.unwrap();
        assert!(frames.has_changed().unwrap());
        assert_eq!(frames.borrow_and_update().text(), "Wrong password");

        lcd.clear().await.unwrap();
        assert_eq!(frames.borrow_and_update().text(), "");
    }

    #[tokio::test]
    async fn test_message_log_is_bounded() {
        let mut lcd = VirtualLcd::new();
        for i in 0..(MAX_MESSAGES + 20) {
            lcd.show(&format!("message {i}"), true).await.unwrap();
        }

        assert_eq!(lcd.messages().count(), MAX_MESSAGES);
        assert_eq!(lcd.messages().next(), Some("message 20"));
        assert!(lcd.has_shown("message 119"));
    }

    #[rstest]
    #[case("", "                ")]
    #[case("OK", "OK              ")]
    #[case("Selected slot 16", "Selected slot 16")]
    #[case("Fingerprint stored", "Fingerprint stor")]
    fn test_pad_line(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(pad_line(text), expected);
    }

    #[test]
    fn test_frame_display_draws_a_box() {
        let rendered = LcdFrame::blank().to_string();
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.starts_with("+----------------+"));
    }
}
