//! Range-drag debouncing
//!
//! Dragging a brush produces a stream of ranges. A [`Debouncer`] lets at most
//! one of them through per window; the latest value seen inside a window is
//! kept and released by [`Debouncer::poll`] once the window has passed.
//! Time is supplied by the caller, so the policy never sleeps.

use std::time::{Duration, Instant};

/// Default commit window for range drags
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    last_commit: Option<Instant>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            last_commit: None,
        }
    }

    fn is_open(&self, now: Instant) -> bool {
        self.last_commit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window)
    }

    /// Offer a value. Returns it when it may be committed now; otherwise it
    /// replaces any pending value.
    pub fn offer(&mut self, value: T, now: Instant) -> Option<T> {
        if self.is_open(now) {
            self.pending = None;
            self.last_commit = Some(now);
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Release the pending value if the window has passed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.is_open(now) {
            self.last_commit = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// Release the pending value regardless of time
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_commit_per_window_latest_wins() {
        let start = Instant::now();
        let ms = |n| start + Duration::from_millis(n);
        let mut debouncer = Debouncer::default();

        assert_eq!(debouncer.offer(1, ms(0)), Some(1));
        assert_eq!(debouncer.offer(2, ms(10)), None);
        assert_eq!(debouncer.offer(3, ms(20)), None);
        assert_eq!(debouncer.poll(ms(40)), None);
        assert_eq!(debouncer.poll(ms(50)), Some(3));
        assert_eq!(debouncer.poll(ms(200)), None);
        assert_eq!(debouncer.offer(4, ms(60)), None);
        assert_eq!(debouncer.flush(), Some(4));
        assert!(!debouncer.has_pending());
    }
}
