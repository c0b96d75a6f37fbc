//! Modeled I/O latency.

use core::iter::Sum;
use core::ops::{Add, AddAssign};

/// Simulated time a faulting or forking thread must wait before running
/// again.
///
/// The memory manager never blocks; it returns the delay and the scheduler
/// puts the thread to sleep until [`IoDelay::wake_at`].
#[must_use]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct IoDelay {
    ticks: u64,
}

impl IoDelay {
    pub const ZERO: Self = Self { ticks: 0 };

    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// Simulated time at which the waiting thread becomes ready.
    #[must_use]
    pub const fn wake_at(self, now: u64) -> u64 {
        now.saturating_add(self.ticks)
    }
}

impl Add for IoDelay {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_ticks(self.ticks.saturating_add(rhs.ticks))
    }
}

impl AddAssign for IoDelay {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for IoDelay {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
