//! # Address Space
//!
//! Everything one process owns in the memory system: its flat page table,
//! its swap store, a copy of its executable header and the executable's
//! name, from which pages are demand-loaded on first touch.
//!
//! ## Lifecycle
//!
//! ```text
//!  new ──► (all entries invalid, no frames)
//!   │
//!   ├─► map_frame + populate   page fault: frame given by the allocator,
//!   │                          filled from the image or from swap
//!   ├─► save_to_swap           eviction: write back if dirty, invalidate
//!   ├─► extend                 append entries for a shared region
//!   └─► drop                   frames are released by the allocator
//! ```
//!
//! The address space never picks frames itself; the caller hands it frames
//! that are already reserved in the frame pool.
//!
//! ## Clean pages
//!
//! When a page is filled from the executable, the same bytes are also stored
//! in its swap slot. An evicted page that was never written can therefore be
//! reloaded from swap without rereading the image, and the dirty bit only
//! decides whether a *write back* is needed.

use crate::filesys::{FileSystem, OpenFile};
use crate::info::{INSTRUCTION_SIZE, NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, STACK_GUARD_BYTES, STACK_REG};
use crate::machine::Machine;
use crate::noff::{NOFF_HEADER_SIZE, NoffError, NoffHeader};
use crate::page_table::{PageTable, PageTableEntry, PageTableHandle, SharedPageTable};
use crate::process::ProcessId;
use crate::swap::SwapStore;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use kernel_memory_addresses::{FrameNumber, PageSize, VirtualAddress, VirtualPageNumber};
use log::{debug, trace, warn};
use spin::{Mutex, MutexGuard};

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PageError {
    #[error("{vpn} outside address space of {pages} pages")]
    OutOfRange {
        vpn: VirtualPageNumber,
        pages: usize,
    },
    #[error("{0} is not resident")]
    NotResident(VirtualPageNumber),
    #[error("{0} lies outside physical memory")]
    FrameOutsideMemory(FrameNumber),
    #[error("cannot reopen executable {0:?}")]
    ExecutableUnavailable(String),
    #[error("{0} has no slot in the swap store")]
    NoSwapSlot(VirtualPageNumber),
    #[error("address space of {0} bytes exceeds the 32-bit address range")]
    AddressOverflow(usize),
}

/// Where [`AddressSpace::populate`] took the page contents from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PopulateSource {
    /// First touch; `bytes` were copied from the executable, the rest is zero.
    Executable { bytes: usize },
    /// Previously evicted; reloaded from the swap store.
    Swap,
}

/// Result of [`AddressSpace::save_to_swap`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Eviction {
    /// Frame the page occupied; now unmapped.
    pub frame: FrameNumber,
    /// Whether the page was dirty and written to the swap store.
    pub written: bool,
}

/// A single process' virtual memory.
#[derive(Debug)]
pub struct AddressSpace {
    pid: ProcessId,
    header: NoffHeader,
    file_name: String,
    page_table: SharedPageTable,
    swap: SwapStore,
    page_size: PageSize,
}

impl AddressSpace {
    /// Build an address space for the program in `executable`.
    ///
    /// The page count covers the code, both data segments and `stack_bytes`
    /// of stack, rounded up to whole pages. Every entry starts invalid and
    /// no frame is allocated.
    ///
    /// # Errors
    /// If the header is short, its magic does not match in either byte
    /// order, or the address space would not fit 32-bit addresses.
    pub fn new(
        pid: ProcessId,
        executable: &mut impl OpenFile,
        name: &str,
        page_size: PageSize,
        stack_bytes: usize,
    ) -> Result<Self, NoffError> {
        let mut raw = [0u8; NOFF_HEADER_SIZE];
        let read = executable.read_at(&mut raw, 0);
        let header = NoffHeader::parse(&raw[..read])?;

        let pages = page_size.pages_for(header.image_size().saturating_add(stack_bytes));
        let bytes = pages.saturating_mul(page_size.bytes());
        if u32::try_from(bytes).is_err() {
            return Err(NoffError::TooLarge(bytes));
        }
        debug!(
            "{pid}: loading {name:?}, {} bytes of image + {stack_bytes} of stack = {pages} pages",
            header.image_size()
        );

        Ok(Self {
            pid,
            header,
            file_name: name.to_string(),
            page_table: Arc::new(Mutex::new(PageTable::new(pages))),
            swap: SwapStore::new(pages, page_size),
            page_size,
        })
    }

    /// An empty copy of this layout for a forked child: same header, name
    /// and page count, all entries invalid, zeroed swap.
    ///
    /// The caller fills in the child's pages.
    #[must_use]
    pub fn fork_layout(&self, child: ProcessId) -> Self {
        let pages = self.num_pages();
        Self {
            pid: child,
            header: self.header,
            file_name: self.file_name.clone(),
            page_table: Arc::new(Mutex::new(PageTable::new(pages))),
            swap: SwapStore::new(pages, self.page_size),
            page_size: self.page_size,
        }
    }

    #[inline]
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    #[inline]
    #[must_use]
    pub const fn header(&self) -> &NoffHeader {
        &self.header
    }

    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[inline]
    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[inline]
    #[must_use]
    pub const fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// Number of virtual pages, including any shared extensions.
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.page_table.lock().len()
    }

    /// Size of the address space in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.num_pages() * self.page_size.bytes()
    }

    /// Locked view of the page table.
    pub fn page_table(&self) -> MutexGuard<'_, PageTable> {
        self.page_table.lock()
    }

    /// Copy of the page table at this instant.
    #[must_use]
    pub fn snapshot(&self) -> PageTable {
        self.page_table.lock().clone()
    }

    /// Copy of one entry.
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn entry(&self, vpn: VirtualPageNumber) -> Result<PageTableEntry, PageError> {
        let table = self.page_table.lock();
        table.get(vpn).copied().ok_or(PageError::OutOfRange {
            vpn,
            pages: table.len(),
        })
    }

    /// Page containing `va`, if it lies inside the address space.
    ///
    /// # Errors
    /// If `va` is beyond the last page.
    pub fn page_of(&self, va: VirtualAddress) -> Result<VirtualPageNumber, PageError> {
        let vpn = va.page(self.page_size);
        let pages = self.num_pages();
        if vpn.as_usize() < pages {
            Ok(vpn)
        } else {
            Err(PageError::OutOfRange { vpn, pages })
        }
    }

    /// Non-owning handle for publishing to the machine.
    #[must_use]
    pub fn handle(&self) -> PageTableHandle {
        PageTableHandle::new(&self.page_table)
    }

    /// Install `frame` for `vpn` and mark the entry valid.
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn map_frame(&self, vpn: VirtualPageNumber, frame: FrameNumber) -> Result<(), PageError> {
        self.with_entry(vpn, |entry| entry.map(frame))
    }

    /// Copy every flag of `parent` into the entry for `vpn`, pointing at
    /// `frame` (or at nothing, if `None`).
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn inherit_entry(
        &self,
        vpn: VirtualPageNumber,
        parent: &PageTableEntry,
        frame: Option<FrameNumber>,
    ) -> Result<(), PageError> {
        self.with_entry(vpn, |entry| entry.inherit_from(parent, frame))
    }

    /// Mark `vpn` as a resident shared page backed by `frame`.
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn map_shared(&self, vpn: VirtualPageNumber, frame: FrameNumber) -> Result<(), PageError> {
        self.with_entry(vpn, |entry| {
            entry.map(frame);
            entry.bits_mut().set_shared(true);
            entry.bits_mut().set_used_before(true);
        })
    }

    /// Fill the frame already mapped at `vpn`.
    ///
    /// The frame is zeroed first. A page never used before receives the
    /// bytes of the code and initialized-data segments that overlap it,
    /// read from the executable reopened by name, and is marked used. A page
    /// used before is copied back from the swap store.
    ///
    /// # Errors
    /// If the page is not mapped, its frame lies outside `memory`, or the
    /// executable can no longer be opened.
    pub fn populate<F: FileSystem>(
        &mut self,
        vpn: VirtualPageNumber,
        memory: &mut [u8],
        files: &F,
    ) -> Result<PopulateSource, PageError> {
        let mut table = self.page_table.lock();
        let pages = table.len();
        let entry = table
            .get_mut(vpn)
            .ok_or(PageError::OutOfRange { vpn, pages })?;
        let frame = entry.frame().ok_or(PageError::NotResident(vpn))?;
        let dst = memory
            .get_mut(frame.byte_range(self.page_size))
            .ok_or(PageError::FrameOutsideMemory(frame))?;
        dst.fill(0);

        if entry.is_used_before() {
            if !self.swap.load(vpn, dst) {
                return Err(PageError::NoSwapSlot(vpn));
            }
            trace!("{}: {vpn} reloaded from swap into {frame}", self.pid);
            return Ok(PopulateSource::Swap);
        }

        let mut file = files
            .open(&self.file_name)
            .ok_or_else(|| PageError::ExecutableUnavailable(self.file_name.clone()))?;
        let page = vpn.byte_range(self.page_size);
        let mut bytes = 0;
        for segment in self.header.loadable() {
            let Some((file_offset, page_offset, len)) = segment.intersect(&page) else {
                continue;
            };
            let read = file.read_at(&mut dst[page_offset..page_offset + len], file_offset);
            if read < len {
                warn!(
                    "{}: short read of {:?} at {file_offset}: {read} of {len} bytes",
                    self.pid, self.file_name
                );
            }
            bytes += read;
        }

        if !self.swap.save(vpn, dst) {
            return Err(PageError::NoSwapSlot(vpn));
        }
        entry.bits_mut().set_used_before(true);
        trace!("{}: {vpn} loaded {bytes} bytes from image into {frame}", self.pid);
        Ok(PopulateSource::Executable { bytes })
    }

    /// Evict `vpn`: write its frame to the swap store if dirty, then mark
    /// the entry invalid.
    ///
    /// # Errors
    /// If the page is not resident or its frame lies outside `memory`.
    pub fn save_to_swap(
        &mut self,
        vpn: VirtualPageNumber,
        memory: &[u8],
    ) -> Result<Eviction, PageError> {
        let mut table = self.page_table.lock();
        let pages = table.len();
        let entry = table
            .get_mut(vpn)
            .ok_or(PageError::OutOfRange { vpn, pages })?;
        let frame = entry.frame().ok_or(PageError::NotResident(vpn))?;

        let written = entry.is_dirty();
        if written {
            let src = memory
                .get(frame.byte_range(self.page_size))
                .ok_or(PageError::FrameOutsideMemory(frame))?;
            if !self.swap.save(vpn, src) {
                return Err(PageError::NoSwapSlot(vpn));
            }
        }
        entry.unmap();
        trace!(
            "{}: {vpn} evicted from {frame}{}",
            self.pid,
            if written { ", written to swap" } else { "" }
        );
        Ok(Eviction { frame, written })
    }

    /// Store `bytes` as the swap copy of `vpn`.
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn seed_swap(&mut self, vpn: VirtualPageNumber, bytes: &[u8]) -> Result<(), PageError> {
        if self.swap.save(vpn, bytes) {
            Ok(())
        } else {
            Err(PageError::NoSwapSlot(vpn))
        }
    }

    /// Drop the mapping of `vpn` without saving its contents, returning the
    /// frame it held. The entry keeps no trace of having been used.
    ///
    /// # Errors
    /// If `vpn` is beyond the page count.
    pub fn discard(&self, vpn: VirtualPageNumber) -> Result<Option<FrameNumber>, PageError> {
        let mut table = self.page_table.lock();
        let pages = table.len();
        let entry = table
            .get_mut(vpn)
            .ok_or(PageError::OutOfRange { vpn, pages })?;
        let frame = entry.frame();
        *entry = PageTableEntry::invalid(vpn);
        Ok(frame)
    }

    /// Append `pages` invalid entries and their swap slots.
    ///
    /// Returns the first new page. A published handle keeps its old length
    /// until the table is published again.
    pub fn extend(&mut self, pages: usize) -> VirtualPageNumber {
        let start = self.page_table.lock().extend(pages);
        self.swap.grow(pages);
        debug!("{}: extended by {pages} pages from {start}", self.pid);
        start
    }

    /// Shrink back to `pages` pages, dropping entries and swap slots above.
    ///
    /// Frames mapped by the dropped entries must already be released.
    pub fn truncate(&mut self, pages: usize) {
        self.page_table.lock().truncate(pages);
        self.swap.truncate(pages);
    }

    /// Reset the register file for a fresh start at address zero, with the
    /// stack pointer just below the top of the address space.
    ///
    /// # Errors
    /// If the stack pointer does not fit a 32-bit register; the registers
    /// are left untouched.
    pub fn init_registers(&self, machine: &mut impl Machine) -> Result<(), PageError> {
        let size = self.size_bytes();
        let stack = u32::try_from(size.saturating_sub(STACK_GUARD_BYTES))
            .map_err(|_| PageError::AddressOverflow(size))?;

        for reg in 0..NUM_TOTAL_REGS {
            machine.write_register(reg, 0);
        }
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, INSTRUCTION_SIZE);

        machine.write_register(STACK_REG, stack);
        debug!("{}: initial stack pointer {stack:#x}", self.pid);
        Ok(())
    }

    /// Withdraw this space's page table from the machine if it is the one
    /// published.
    pub fn save_state_on_switch(&self, machine: &mut impl Machine) {
        if machine
            .page_table()
            .is_some_and(|handle| handle.refers_to(&self.page_table))
        {
            machine.publish_page_table(None);
        }
    }

    /// Publish this space's page table, with its current length, to the
    /// machine.
    pub fn restore_state_on_switch(&self, machine: &mut impl Machine) {
        machine.publish_page_table(Some(self.handle()));
    }

    fn with_entry(
        &self,
        vpn: VirtualPageNumber,
        f: impl FnOnce(&mut PageTableEntry),
    ) -> Result<(), PageError> {
        let mut table = self.page_table.lock();
        let pages = table.len();
        let entry = table
            .get_mut(vpn)
            .ok_or(PageError::OutOfRange { vpn, pages })?;
        f(entry);
        Ok(())
    }
}
