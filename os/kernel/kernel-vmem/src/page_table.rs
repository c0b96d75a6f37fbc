//! # Flat Page Table
//!
//! One [`PageTableEntry`] per virtual page, indexed by virtual page number.
//! The table is exclusively owned by its address space (as a
//! [`SharedPageTable`] so the machine can hold a [`PageTableHandle`] to it)
//! and only ever grows by appending entries at the end.

use crate::page_entry_bits::{NO_FRAME, PageEntryBits};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use kernel_memory_addresses::{FrameNumber, VirtualPageNumber};
use spin::Mutex;

/// Page table owned by an address space.
pub type SharedPageTable = Arc<Mutex<PageTable>>;

/// A single entry: the fixed virtual page number plus its status bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageTableEntry {
    virtual_page: VirtualPageNumber,
    bits: PageEntryBits,
}

impl PageTableEntry {
    /// A fresh entry: not valid, not used, not dirty, not shared, writable,
    /// mapping no frame.
    #[inline]
    #[must_use]
    pub const fn invalid(virtual_page: VirtualPageNumber) -> Self {
        Self {
            virtual_page,
            bits: PageEntryBits::new().with_frame_bits(NO_FRAME),
        }
    }

    #[inline]
    #[must_use]
    pub const fn virtual_page(&self) -> VirtualPageNumber {
        self.virtual_page
    }

    #[inline]
    #[must_use]
    pub const fn bits(&self) -> PageEntryBits {
        self.bits
    }

    /// Mutable access to the flags. The virtual page number stays fixed.
    #[inline]
    pub const fn bits_mut(&mut self) -> &mut PageEntryBits {
        &mut self.bits
    }

    /// The resident frame; `None` unless the entry is valid.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Option<FrameNumber> {
        self.bits.frame()
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.bits.valid()
    }

    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.bits.dirty()
    }

    #[inline]
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.bits.shared()
    }

    #[inline]
    #[must_use]
    pub const fn is_used_before(&self) -> bool {
        self.bits.used_before()
    }

    #[inline]
    #[must_use]
    pub const fn is_referenced(&self) -> bool {
        self.bits.referenced()
    }

    #[inline]
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.bits.read_only()
    }

    /// Install `frame` and mark the entry valid.
    pub fn map(&mut self, frame: FrameNumber) {
        self.bits.set_frame(frame);
        self.bits.set_valid(true);
    }

    /// Mark the entry invalid and clean, returning the frame it mapped.
    ///
    /// `used_before`, `shared` and `read_only` survive.
    pub fn unmap(&mut self) -> Option<FrameNumber> {
        let frame = self.frame();
        self.bits.set_valid(false);
        self.bits.set_dirty(false);
        self.bits.set_referenced(false);
        self.bits.clear_frame();
        frame
    }

    /// Copy every flag of `parent` but point at `frame` instead.
    ///
    /// Used by fork; `frame` is the freshly copied frame for private pages
    /// or the parent's own frame for shared ones.
    pub fn inherit_from(&mut self, parent: &Self, frame: Option<FrameNumber>) {
        self.bits = parent.bits;
        match frame {
            Some(frame) => self.bits.set_frame(frame),
            None => {
                self.bits.set_valid(false);
                self.bits.clear_frame();
            }
        }
    }
}

/// Flat, growable page table.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// A table of `pages` invalid entries numbered `0..pages`.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        let mut table = Self {
            entries: Vec::with_capacity(pages),
        };
        table.extend(pages);
        table
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, vpn: VirtualPageNumber) -> Option<&PageTableEntry> {
        self.entries.get(vpn.as_usize())
    }

    #[inline]
    pub fn get_mut(&mut self, vpn: VirtualPageNumber) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(vpn.as_usize())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[PageTableEntry] {
        &self.entries
    }

    /// Append `pages` invalid entries; returns the first new page number.
    pub fn extend(&mut self, pages: usize) -> VirtualPageNumber {
        let start = self.entries.len();
        self.entries.extend(
            (start..start + pages)
                .filter_map(VirtualPageNumber::from_index)
                .map(PageTableEntry::invalid),
        );
        VirtualPageNumber::from_index(start).unwrap_or_default()
    }

    /// Drop every entry from page `pages` on.
    pub fn truncate(&mut self, pages: usize) {
        self.entries.truncate(pages);
    }
}

/// Non-owning view of a page table, as published to the machine.
///
/// Holds the table weakly together with the length that was current at
/// publication time; the machine never keeps an address space's table alive
/// and never sees entries appended after it was last published.
#[derive(Debug, Clone)]
pub struct PageTableHandle {
    table: Weak<Mutex<PageTable>>,
    len: usize,
}

impl PageTableHandle {
    #[must_use]
    pub fn new(table: &SharedPageTable) -> Self {
        let len = table.lock().len();
        Self {
            table: Arc::downgrade(table),
            len,
        }
    }

    /// Number of entries visible through this handle.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The table, if its address space still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<SharedPageTable> {
        self.table.upgrade()
    }

    /// Whether this handle refers to `table`.
    #[must_use]
    pub fn refers_to(&self, table: &SharedPageTable) -> bool {
        core::ptr::eq(self.table.as_ptr(), Arc::as_ptr(table))
    }
}
