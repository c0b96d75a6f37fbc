//! Per-process swap store.

use alloc::vec;
use alloc::vec::Vec;
use kernel_memory_addresses::{PageSize, VirtualPageNumber};

/// Backing bytes for an address space's evicted pages.
///
/// Always exactly `pages × page_size` bytes; page `n` lives at
/// `n * page_size`. Starts zeroed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SwapStore {
    bytes: Vec<u8>,
    page_size: PageSize,
}

impl SwapStore {
    #[must_use]
    pub fn new(pages: usize, page_size: PageSize) -> Self {
        Self {
            bytes: vec![0; pages * page_size.bytes()],
            page_size,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub const fn pages(&self) -> usize {
        self.bytes.len() / self.page_size.bytes()
    }

    /// The stored copy of page `vpn`.
    #[must_use]
    pub fn page(&self, vpn: VirtualPageNumber) -> Option<&[u8]> {
        self.bytes.get(vpn.byte_range(self.page_size))
    }

    pub fn page_mut(&mut self, vpn: VirtualPageNumber) -> Option<&mut [u8]> {
        self.bytes.get_mut(vpn.byte_range(self.page_size))
    }

    /// Copy `src` (one page) into the slot of `vpn`.
    ///
    /// Returns `false` if `vpn` is outside the store.
    pub fn save(&mut self, vpn: VirtualPageNumber, src: &[u8]) -> bool {
        match self.page_mut(vpn) {
            Some(slot) if slot.len() == src.len() => {
                slot.copy_from_slice(src);
                true
            }
            _ => false,
        }
    }

    /// Copy the slot of `vpn` into `dst` (one page).
    ///
    /// Returns `false` if `vpn` is outside the store.
    pub fn load(&self, vpn: VirtualPageNumber, dst: &mut [u8]) -> bool {
        match self.page(vpn) {
            Some(slot) if slot.len() == dst.len() => {
                dst.copy_from_slice(slot);
                true
            }
            _ => false,
        }
    }

    /// Append `pages` zeroed page slots.
    pub fn grow(&mut self, pages: usize) {
        let len = self.bytes.len() + pages * self.page_size.bytes();
        self.bytes.resize(len, 0);
    }

    /// Drop every slot from page `pages` on.
    pub fn truncate(&mut self, pages: usize) {
        self.bytes.truncate(pages * self.page_size.bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_one_page() {
        let ps = PageSize::new(8).unwrap();
        let mut swap = SwapStore::new(3, ps);
        assert_eq!(swap.len(), 24);

        assert!(swap.save(VirtualPageNumber::new(1), &[7; 8]));
        let mut out = [0; 8];
        assert!(swap.load(VirtualPageNumber::new(1), &mut out));
        assert_eq!(out, [7; 8]);
        assert_eq!(swap.page(VirtualPageNumber::new(0)), Some(&[0u8; 8][..]));
    }

    #[test]
    fn rejects_out_of_range_pages() {
        let ps = PageSize::new(8).unwrap();
        let mut swap = SwapStore::new(2, ps);
        assert!(!swap.save(VirtualPageNumber::new(2), &[1; 8]));
        swap.grow(1);
        assert_eq!(swap.pages(), 3);
        assert!(swap.save(VirtualPageNumber::new(2), &[1; 8]));

        swap.truncate(1);
        assert_eq!(swap.len(), 8);
        assert!(!swap.load(VirtualPageNumber::new(1), &mut [0; 8]));
    }
}
