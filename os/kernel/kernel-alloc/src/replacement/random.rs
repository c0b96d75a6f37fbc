use super::{ReplacementPolicy, free_frame};
use crate::FrameError;
use crate::frame_pool::FramePool;
use alloc::vec::Vec;
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::FrameNumber;
use kernel_vmem::ReferenceBits;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

/// Free frames first, then a uniformly random evictable victim.
#[derive(Debug, Clone)]
pub struct RandomReplacement<R = SmallRng> {
    rng: R,
}

impl RandomReplacement<SmallRng> {
    /// Deterministic policy seeded with `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> RandomReplacement<R> {
    pub const fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore> ReplacementPolicy for RandomReplacement<R> {
    fn kind(&self) -> ReplacementKind {
        ReplacementKind::Random
    }

    fn select(
        &mut self,
        pool: &FramePool,
        _refs: &mut dyn ReferenceBits,
        exclude: Option<FrameNumber>,
    ) -> Result<FrameNumber, FrameError> {
        if let Some(frame) = free_frame(pool, exclude) {
            return Ok(frame);
        }

        let candidates: Vec<FrameNumber> = pool
            .iter()
            .filter(|&(frame, slot)| slot.is_evictable() && Some(frame) != exclude)
            .map(|(frame, _)| frame)
            .collect();
        if candidates.is_empty() {
            return Err(FrameError::NoVictim);
        }
        Ok(candidates[self.rng.gen_range(0..candidates.len())])
    }
}
