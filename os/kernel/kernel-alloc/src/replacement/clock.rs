use super::{ReplacementPolicy, free_frame};
use crate::FrameError;
use crate::frame_pool::FramePool;
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::FrameNumber;
use kernel_vmem::ReferenceBits;

/// Second-chance clock over the machine's per-frame reference bits.
///
/// While the pool is full, the hand sweeps the frames in order. A frame
/// whose reference bit is set gets a second chance: the bit is cleared and
/// the hand moves on. The first evictable frame found with its bit already
/// clear is the victim; its bit is set and the hand stops just past it.
/// Shared and excluded frames are skipped without touching their bits.
///
/// ```text
///            hand
///             ▼
///   ref:  1   1   0   1        ref:  1   0   1   1
///        [0] [1] [2] [3]   ─►       [0] [1] [2] [3]
///                                            ▲
///   victim = frame 2                        hand
/// ```
#[derive(Debug, Default, Clone)]
pub struct ClockReplacement {
    hand: usize,
}

impl ClockReplacement {
    #[must_use]
    pub const fn new() -> Self {
        Self { hand: 0 }
    }

    /// Frame index the next sweep starts at.
    #[must_use]
    pub const fn hand(&self) -> usize {
        self.hand
    }
}

impl ReplacementPolicy for ClockReplacement {
    fn kind(&self) -> ReplacementKind {
        ReplacementKind::Clock
    }

    fn select(
        &mut self,
        pool: &FramePool,
        refs: &mut dyn ReferenceBits,
        exclude: Option<FrameNumber>,
    ) -> Result<FrameNumber, FrameError> {
        if let Some(frame) = free_frame(pool, exclude) {
            return Ok(frame);
        }

        let n = pool.len();
        if n == 0 {
            return Err(FrameError::NoVictim);
        }

        // Two passes suffice: the first clears every set bit it passes.
        for _ in 0..=2 * n {
            let index = self.hand % n;
            self.hand = (index + 1) % n;
            let Some(frame) = FrameNumber::from_index(index) else {
                continue;
            };
            if Some(frame) == exclude || !pool.is_evictable(frame) {
                continue;
            }
            if refs.is_referenced(frame) {
                refs.set_referenced(frame, false);
                continue;
            }
            refs.set_referenced(frame, true);
            return Ok(frame);
        }
        Err(FrameError::NoVictim)
    }
}
