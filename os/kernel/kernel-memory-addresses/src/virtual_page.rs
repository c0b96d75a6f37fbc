use crate::{PageSize, VirtualAddress};
use core::fmt;

/// Virtual page number: index into a flat, per-process page table.
///
/// ### Invariants
/// - A page table entry's virtual page number equals its index and never
///   changes after the entry is created.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPageNumber(u32);

impl VirtualPageNumber {
    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Page number for a page-table index.
    ///
    /// Returns `None` if `index` does not fit a 32-bit page number.
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

    /// First virtual address of the page.
    #[inline]
    #[must_use]
    pub const fn base(self, page_size: PageSize) -> VirtualAddress {
        #[allow(clippy::cast_possible_truncation)]
        VirtualAddress::new((self.as_usize() * page_size.bytes()) as u32)
    }

    /// Byte range of the page, in virtual address units.
    #[inline]
    #[must_use]
    pub const fn byte_range(self, page_size: PageSize) -> core::ops::Range<usize> {
        let start = self.as_usize() * page_size.bytes();
        start..start + page_size.bytes()
    }
}

impl fmt::Display for VirtualPageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vpn#{}", self.0)
    }
}

impl fmt::Debug for VirtualPageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPageNumber({})", self.0)
    }
}

impl From<VirtualPageNumber> for usize {
    #[inline]
    fn from(vpn: VirtualPageNumber) -> Self {
        vpn.as_usize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_and_range_scale_with_page_size() {
        let ps = PageSize::new(64).unwrap();
        let vpn = VirtualPageNumber::new(3);
        assert_eq!(vpn.base(ps), VirtualAddress::new(192));
        assert_eq!(vpn.byte_range(ps), 192..256);
        assert_eq!(VirtualPageNumber::from_index(3), Some(vpn));
    }
}
