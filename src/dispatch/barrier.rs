use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown latch that elects the last arriving task.
///
/// Starts at the number of live tasks; each task calls [`arrive`] once. The
/// join runs in whichever task brings the count to zero, regardless of which
/// tasks are still outstanding.
///
/// [`arrive`]: CountedBarrier::arrive
#[derive(Debug)]
pub struct CountedBarrier {
    remaining: AtomicUsize,
}

impl CountedBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
        }
    }

    /// Record one arrival; returns `true` for exactly one caller, the last.
    pub fn arrive(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous == 1)
            .unwrap_or(false)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}
