use crate::PageSize;
use core::fmt;
use core::ops::Range;

/// Index of a physical memory frame.
///
/// A frame number is only meaningful relative to a machine's physical memory;
/// frame `n` occupies bytes `n * page_size .. (n + 1) * page_size` of it.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let ps = PageSize::new(128).unwrap();
/// let frame = FrameNumber::new(3);
/// assert_eq!(frame.base(ps), 384);
/// assert_eq!(frame.byte_range(ps).len(), 128);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Frame number for a pool index.
    ///
    /// Returns `None` if `index` does not fit the 32-bit frame field.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index > u32::MAX as usize {
            None
        } else {
            #[allow(clippy::cast_possible_truncation)]
            Some(Self(index as u32))
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of the frame in physical memory.
    #[inline]
    #[must_use]
    pub const fn base(self, page_size: PageSize) -> usize {
        self.as_usize() * page_size.bytes()
    }

    /// Byte range the frame occupies in physical memory.
    #[inline]
    #[must_use]
    pub const fn byte_range(self, page_size: PageSize) -> Range<usize> {
        let base = self.base(page_size);
        base..base + page_size.bytes()
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameNumber({})", self.0)
    }
}

impl From<FrameNumber> for usize {
    #[inline]
    fn from(frame: FrameNumber) -> Self {
        frame.as_usize()
    }
}
