//! Human-facing diagnostics.
//!
//! Sessions write short status lines ("session active == true",
//! "place(poster_a)") to a [`DiagnosticsSink`]. Sinks are fire-and-forget:
//! they must not panic and a session without one uses [`NullDiagnostics`].
//! [`DebugOverlay`] keeps recent lines on screen for a fixed lifetime.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Receiver of diagnostic lines.
pub trait DiagnosticsSink {
    /// Record `message` at session time `at_s` (seconds).
    fn log(&mut self, at_s: f64, message: &str);

    /// Called once per frame with the session clock.
    fn tick(&mut self, _now_s: f64) {}
}

/// Sink with no listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnostics;

impl DiagnosticsSink for NullDiagnostics {
    fn log(&mut self, _at_s: f64, _message: &str) {}
}

/// Shared sinks are skipped, not panicked on, while borrowed elsewhere.
impl<T: DiagnosticsSink> DiagnosticsSink for Rc<RefCell<T>> {
    fn log(&mut self, at_s: f64, message: &str) {
        if let Ok(mut inner) = self.try_borrow_mut() {
            inner.log(at_s, message);
        }
    }

    fn tick(&mut self, now_s: f64) {
        if let Ok(mut inner) = self.try_borrow_mut() {
            inner.tick(now_s);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OverlayLine {
    text: String,
    expires_at_s: f64,
}

/// Rolling on-screen message list.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugOverlay {
    lifetime_s: f64,
    lines: VecDeque<OverlayLine>,
}

impl DebugOverlay {
    /// Overlay whose messages disappear after `lifetime_s` seconds.
    pub fn new(lifetime_s: f64) -> Self {
        Self {
            lifetime_s,
            lines: VecDeque::new(),
        }
    }

    /// Drop messages that expired at or before `now_s`.
    pub fn expire(&mut self, now_s: f64) {
        while self
            .lines
            .front()
            .is_some_and(|line| line.expires_at_s <= now_s)
        {
            self.lines.pop_front();
        }
    }

    /// Number of visible messages.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// `true` when nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Visible messages, oldest first, one per line.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DiagnosticsSink for DebugOverlay {
    fn log(&mut self, at_s: f64, message: &str) {
        self.expire(at_s);
        self.lines.push_back(OverlayLine {
            text: format!("[ {} ] {}", format_clock(at_s), message),
            expires_at_s: at_s + self.lifetime_s,
        });
    }

    fn tick(&mut self, now_s: f64) {
        self.expire(now_s);
    }
}

/// `HH:MM:SS` of a session time in seconds, wrapping at 24 h.
fn format_clock(at_s: f64) -> String {
    let total = if at_s.is_finite() && at_s > 0.0 {
        at_s as u64
    } else {
        0
    };
    let (h, m, s) = ((total / 3600) % 24, (total / 60) % 60, total % 60);
    format!("{:02}:{:02}:{:02}", h, m, s)
}
