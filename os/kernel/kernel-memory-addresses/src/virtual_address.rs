use crate::{PageSize, VirtualPageNumber};
use core::fmt;
use core::ops::Add;

/// User virtual address.
///
/// Carries only the *kind* of address; range checks against a concrete
/// address space happen in the page fault path.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let ps = PageSize::new(64).unwrap();
/// let va = VirtualAddress::new(10);
/// assert_eq!(va.page(ps), VirtualPageNumber::new(0));
/// assert_eq!(va.offset(ps), 10);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
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

    /// Virtual page containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self, page_size: PageSize) -> VirtualPageNumber {
        #[allow(clippy::cast_possible_truncation)]
        VirtualPageNumber::new((self.as_usize() / page_size.bytes()) as u32)
    }

    /// Byte offset of this address inside its page.
    #[inline]
    #[must_use]
    pub const fn offset(self, page_size: PageSize) -> usize {
        self.as_usize() % page_size.bytes()
    }

    /// Split into page number and in-page offset.
    #[inline]
    #[must_use]
    pub const fn split(self, page_size: PageSize) -> (VirtualPageNumber, usize) {
        (self.page(page_size), self.offset(page_size))
    }

    /// Checked offset; `None` on 32-bit overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualAddress({:#010x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_rebuild() {
        let ps = PageSize::new(128).unwrap();
        let va = VirtualAddress::new(1000);
        let (vpn, off) = va.split(ps);
        assert_eq!(vpn.as_u32(), 7);
        assert_eq!(off, 1000 - 7 * 128);
        assert_eq!(vpn.base(ps).as_usize() + off, va.as_usize());
    }

    #[test]
    fn checked_add_detects_overflow() {
        assert!(VirtualAddress::new(u32::MAX).checked_add(1).is_none());
        assert_eq!(
            VirtualAddress::new(4).checked_add(4),
            Some(VirtualAddress::new(8))
        );
    }
}
