use core::fmt;
use core::num::NonZeroUsize;

/// Number of bytes in one virtual page and one physical frame.
///
/// Always non-zero. Need not be a power of two; all conversions use division
/// rather than shifts.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageSize(NonZeroUsize);

impl PageSize {
    /// Returns `None` for a zero-byte page.
    #[inline]
    #[must_use]
    pub const fn new(bytes: usize) -> Option<Self> {
        match NonZeroUsize::new(bytes) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0.get()
    }

    /// Number of pages needed to hold `bytes` bytes (rounds up).
    ///
    /// ```rust
    /// # use kernel_memory_addresses::PageSize;
    /// let ps = PageSize::new(64).unwrap();
    /// assert_eq!(ps.pages_for(0), 0);
    /// assert_eq!(ps.pages_for(64), 1);
    /// assert_eq!(ps.pages_for(100), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn pages_for(self, bytes: usize) -> usize {
        bytes.div_ceil(self.0.get())
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B", self.0)
    }
}

impl fmt::Debug for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageSize({})", self.0)
    }
}
