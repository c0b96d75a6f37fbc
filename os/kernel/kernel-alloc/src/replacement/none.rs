use super::ReplacementPolicy;
use crate::FrameError;
use crate::frame_pool::FramePool;
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::FrameNumber;
use kernel_vmem::ReferenceBits;

/// Hands out frames `0, 1, 2, …` and never evicts.
///
/// The counter is monotonic: frames released at process teardown are not
/// handed out again.
#[derive(Debug, Default, Clone)]
pub struct NoReplacement {
    allocated: usize,
}

impl NoReplacement {
    #[must_use]
    pub const fn new() -> Self {
        Self { allocated: 0 }
    }

    /// Frames handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }
}

impl ReplacementPolicy for NoReplacement {
    fn kind(&self) -> ReplacementKind {
        ReplacementKind::NoReplacement
    }

    fn select(
        &mut self,
        pool: &FramePool,
        _refs: &mut dyn ReferenceBits,
        _exclude: Option<FrameNumber>,
    ) -> Result<FrameNumber, FrameError> {
        if self.allocated >= pool.len() {
            return Err(FrameError::Exhausted { frames: pool.len() });
        }
        let frame =
            FrameNumber::from_index(self.allocated).ok_or(FrameError::Exhausted { frames: pool.len() })?;
        self.allocated += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PageSize;
    use kernel_vmem::SimMachine;

    #[test]
    fn counts_up_then_fails() {
        let pool = FramePool::new(3);
        let mut refs = SimMachine::new(PageSize::new(16).unwrap(), 3);
        let mut policy = NoReplacement::new();

        let frames: Vec<_> = (0..3)
            .map(|_| policy.select(&pool, &mut refs, None).unwrap())
            .collect();
        assert_eq!(
            frames,
            [0, 1, 2].map(FrameNumber::new).to_vec()
        );
        assert_eq!(
            policy.select(&pool, &mut refs, None),
            Err(FrameError::Exhausted { frames: 3 })
        );
    }
}
