//! Paging counters.

use core::fmt;

/// Counters maintained by the memory manager.
///
/// `page_faults` follows the accounting of the original kernel's statistics:
/// besides true demand faults it counts one event per page copied and per
/// shared page aliased during fork. [`Statistics::demand_faults`] recovers
/// the number of real faults.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Statistics {
    pub page_faults: u64,
    /// Private pages copied into a child during fork.
    pub fork_copies: u64,
    /// Shared pages aliased into a child during fork.
    pub shared_aliases: u64,
    /// Pages evicted to make room.
    pub evictions: u64,
    /// Evictions that wrote a dirty page to swap.
    pub swap_writes: u64,
}

impl Statistics {
    /// Faults taken on access to a non-resident page.
    #[must_use]
    pub const fn demand_faults(&self) -> u64 {
        self.page_faults
            .saturating_sub(self.fork_copies)
            .saturating_sub(self.shared_aliases)
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Paging: faults {}, demand {}, fork copies {}, shared aliases {}, evictions {}, swap writes {}",
            self.page_faults,
            self.demand_faults(),
            self.fork_copies,
            self.shared_aliases,
            self.evictions,
            self.swap_writes
        )
    }
}
