//! # Page Replacement
//!
//! A [`ReplacementPolicy`] picks the frame that will hold a page about to be
//! loaded. When free frames remain, every policy hands one out; otherwise
//! the random and clock policies choose a *victim* among the privately held
//! frames, which the memory manager then swaps out to its owner before
//! reuse.
//!
//! | Policy | Free frames | Pool full |
//! |:--|:--|:--|
//! | [`NoReplacement`] | next frame from a monotonic counter | [`FrameError::Exhausted`] |
//! | [`RandomReplacement`] | lowest free frame | uniform over evictable frames |
//! | [`ClockReplacement`] | lowest free frame | second-chance sweep over reference bits |
//!
//! Every policy honors an optional *excluded* frame, which is never returned
//! while the pool is full. Shared frames are never returned either. When no
//! candidate remains, the policy fails with [`FrameError::NoVictim`].

mod clock;
mod none;
mod random;

pub use clock::ClockReplacement;
pub use none::NoReplacement;
pub use random::RandomReplacement;

use crate::FrameError;
use crate::frame_pool::FramePool;
use alloc::boxed::Box;
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::FrameNumber;
use kernel_vmem::ReferenceBits;

/// Strategy selecting the frame for the next page load.
pub trait ReplacementPolicy {
    fn kind(&self) -> ReplacementKind;

    /// Choose a frame. The returned frame is either free or privately held
    /// (and then must be evicted by the caller), and never equals `exclude`.
    ///
    /// # Errors
    /// [`FrameError::Exhausted`] when the no-replacement counter has run past
    /// the pool, [`FrameError::NoVictim`] when every frame is pinned or
    /// excluded.
    fn select(
        &mut self,
        pool: &FramePool,
        refs: &mut dyn ReferenceBits,
        exclude: Option<FrameNumber>,
    ) -> Result<FrameNumber, FrameError>;
}

/// Build the policy named by `kind`; `seed` feeds the random policy.
#[must_use]
pub fn policy_for(kind: ReplacementKind, seed: u64) -> Box<dyn ReplacementPolicy> {
    match kind {
        ReplacementKind::NoReplacement => Box::new(NoReplacement::new()),
        ReplacementKind::Random => Box::new(RandomReplacement::seeded(seed)),
        ReplacementKind::Clock => Box::new(ClockReplacement::new()),
    }
}

/// First free frame other than `exclude`.
fn free_frame(pool: &FramePool, exclude: Option<FrameNumber>) -> Option<FrameNumber> {
    pool.iter()
        .find(|&(frame, slot)| slot.is_free() && Some(frame) != exclude)
        .map(|(frame, _)| frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_configured_policy() {
        for kind in [
            ReplacementKind::NoReplacement,
            ReplacementKind::Random,
            ReplacementKind::Clock,
        ] {
            assert_eq!(policy_for(kind, 7).kind(), kind);
        }
    }
}
