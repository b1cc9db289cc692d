use std::time::{Duration, Instant};

/// Quiet window after the last keystroke before a stop signal goes out.
pub const QUIET_WINDOW: Duration = Duration::from_secs(3);

/// Signal the embedding should emit onto the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Debounce for local typing activity: one start signal per burst of input,
/// one stop signal once the quiet window elapses. Bounds typing-event
/// network chatter to at most two signals per burst.
///
/// Clocks are passed in explicitly so the logic stays deterministic.
#[derive(Debug, Default)]
pub struct TypingDebounce {
    last_input: Option<Instant>,
}

impl TypingDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record local input. Returns `Start` only on the first keystroke of a
    /// burst; further keystrokes just extend the quiet window.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_idle = self.last_input.is_none();
        self.last_input = Some(now);
        was_idle.then_some(TypingSignal::Start)
    }

    /// Called periodically (or from a timer). Returns `Stop` once the quiet
    /// window has passed with no further input.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.last_input {
            Some(last) if now.duration_since(last) >= QUIET_WINDOW => {
                self.last_input = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Force-stop, e.g. when the message is sent or the chat is deselected.
    /// Returns `Stop` if a start signal was outstanding.
    pub fn finish(&mut self) -> Option<TypingSignal> {
        self.last_input.take().map(|_| TypingSignal::Stop)
    }

    pub fn is_typing(&self) -> bool {
        self.last_input.is_some()
    }
}
