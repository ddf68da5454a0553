//! Polling backoff schedules.
//!
//! A backoff is a finite, non-decreasing list of delays plus a cursor.
//! The orchestrator sleeps for [`Backoff::current`] before each poll,
//! advances on an empty poll and resets as soon as work shows up. The
//! first slot is always zero so a fresh (or freshly reset) schedule polls
//! immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A delay schedule consulted by the orchestrator between polls.
///
/// All methods take `&self`; implementations must tolerate concurrent
/// callers.
pub trait Backoff: Send + Sync {
    /// Delay at the current position. No side effects.
    fn current(&self) -> Duration;

    /// Advance one position. Saturates at the last position.
    fn next(&self);

    /// Return to the first position (zero delay).
    fn reset(&self);
}

/// Backoff over a precomputed list of intervals.
#[derive(Debug)]
pub struct IntervalBackoff {
    intervals: Vec<Duration>,
    cursor: AtomicUsize,
}

impl IntervalBackoff {
    /// Build a schedule from explicit intervals.
    ///
    /// A leading zero is inserted when the list does not start with one, and
    /// the list is made non-decreasing by carrying the running maximum.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Duration>) -> Self {
        let mut out = vec![Duration::ZERO];
        let mut max = Duration::ZERO;
        for (i, d) in intervals.into_iter().enumerate() {
            if i == 0 && d.is_zero() {
                continue;
            }
            max = max.max(d);
            out.push(max);
        }
        Self {
            intervals: out,
            cursor: AtomicUsize::new(0),
        }
    }

    /// `[0, delay]`: poll immediately, then wait `delay` after every empty
    /// poll until work arrives.
    pub fn constant(delay: Duration) -> Self {
        Self::from_intervals([delay])
    }

    /// `[0, d, 2d, 4d, .., d * 2^(steps-1)]`, saturating at the last value.
    ///
    /// Generation stops once doubling no longer grows the delay (zero, or
    /// saturated at `Duration::MAX`); further steps would repeat it, so any
    /// depth is safe.
    pub fn exponential(steps: usize, initial: Duration) -> Self {
        let mut intervals = Vec::new();
        let mut next = initial;
        for _ in 0..steps {
            intervals.push(next);
            let doubled = next.saturating_mul(2);
            if doubled == next {
                break;
            }
            next = doubled;
        }
        Self::from_intervals(intervals)
    }

    /// The full schedule, including the leading zero.
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}

impl Backoff for IntervalBackoff {
    fn current(&self) -> Duration {
        self.intervals[self.cursor.load(Ordering::Acquire)]
    }

    fn next(&self) {
        let last = self.intervals.len() - 1;
        // Err just means we were already at the end.
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                (i < last).then_some(i + 1)
            });
    }

    fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
    }
}

impl<B: Backoff + ?Sized> Backoff for std::sync::Arc<B> {
    fn current(&self) -> Duration {
        (**self).current()
    }

    fn next(&self) {
        (**self).next()
    }

    fn reset(&self) {
        (**self).reset()
    }
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn current(&self) -> Duration {
        (**self).current()
    }

    fn next(&self) {
        (**self).next()
    }

    fn reset(&self) {
        (**self).reset()
    }
}
