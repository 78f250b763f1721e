use std::time::Duration;

use tokio::time::Instant;

use crate::message::TurnKind;
use crate::timer::Debounce;

pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(2_500);

/// Aggregated user contribution flushed into one AI turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub content: String,
    pub image_url: Option<String>,
    pub turn_kind: TurnKind,
}

/// Debounced buffer that coalesces bursts of user activity into a single turn.
///
/// Every enqueue restarts the quiet window; typing suppresses the window entirely until
/// the input is cleared or submitted.
#[derive(Debug)]
pub struct TurnAggregator {
    quiet_window: Duration,
    segments: Vec<String>,
    image_url: Option<String>,
    turn_kind: TurnKind,
    timer: Debounce,
    typing: bool,
}

impl TurnAggregator {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            segments: Vec::new(),
            image_url: None,
            turn_kind: TurnKind::Text,
            timer: Debounce::Idle,
            typing: false,
        }
    }

    /// Buffers one text segment. Blank segments never reach the buffer.
    pub fn enqueue_text(&mut self, text: &str, kind: TurnKind, now: Instant) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        self.segments.push(text.to_string());
        if kind == TurnKind::Audio {
            self.turn_kind = TurnKind::Audio;
        }
        self.restart_window(now);
        true
    }

    /// Buffers an uploaded image; a later image replaces an unflushed earlier one.
    pub fn enqueue_image(&mut self, url: &str, now: Instant) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }

        if let Some(previous) = self.image_url.replace(url.to_string()) {
            tracing::debug!(previous = %previous, "replacing unflushed image in pending turn");
        }
        self.restart_window(now);
        true
    }

    /// Tracks whether the user is actively editing input.
    ///
    /// Typing cancels the pending window outright. Clearing or submitting the input starts
    /// a fresh window over whatever is still buffered instead of triggering immediately.
    pub fn set_typing(&mut self, typing: bool, now: Instant) {
        if typing {
            if self.timer.is_armed() {
                tracing::debug!("typing suppressed pending turn trigger");
            }
            self.typing = true;
            self.timer.cancel();
            return;
        }

        self.typing = false;
        if !self.is_empty() {
            self.restart_window(now);
        }
    }

    /// Flushes the buffer once the quiet window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<PendingTurn> {
        if !self.timer.fire(now) || self.is_empty() {
            return None;
        }

        let turn = PendingTurn {
            content: std::mem::take(&mut self.segments).join(" "),
            image_url: self.image_url.take(),
            turn_kind: std::mem::take(&mut self.turn_kind),
        };
        Some(turn)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.image_url.is_none()
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Drops buffered content and the pending window (conversation teardown).
    pub fn reset(&mut self) {
        self.segments.clear();
        self.image_url = None;
        self.turn_kind = TurnKind::Text;
        self.timer.cancel();
        self.typing = false;
    }

    fn restart_window(&mut self, now: Instant) {
        if self.typing {
            return;
        }
        self.timer.arm(now + self.quiet_window);
    }
}

impl Default for TurnAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_WINDOW)
    }
}
