//! # Active Execution Context
//!
//! The memory manager talks to the CPU emulator through [`Machine`]: a flat
//! byte array of physical memory, the register file, the slot where the
//! active page table is published, and one reference bit per frame that the
//! clock policy consumes.
//!
//! [`SimMachine`] is a minimal implementation with a software translation
//! path, used by the host tool and the tests to play the part of user code.

use crate::info::NUM_TOTAL_REGS;
use crate::page_table::PageTableHandle;
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::config::{ConfigError, MemoryConfig};
use kernel_memory_addresses::{FrameNumber, PageSize, VirtualAddress};

/// Per-frame reference bits.
pub trait ReferenceBits {
    /// Number of frames the bits cover.
    fn frame_count(&self) -> usize;

    fn is_referenced(&self, frame: FrameNumber) -> bool;

    fn set_referenced(&mut self, frame: FrameNumber, referenced: bool);
}

/// The CPU emulator as seen by the memory manager.
pub trait Machine: ReferenceBits {
    /// All of physical memory.
    fn main_memory(&self) -> &[u8];

    fn main_memory_mut(&mut self) -> &mut [u8];

    fn read_register(&self, index: usize) -> u32;

    fn write_register(&mut self, index: usize, value: u32);

    /// Make `table` the page table used for translation, or clear it.
    fn publish_page_table(&mut self, table: Option<PageTableHandle>);

    /// The currently published page table.
    fn page_table(&self) -> Option<&PageTableHandle>;
}

/// Traps raised by the translation path.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Exception {
    #[error("page fault at {0}")]
    PageFault(VirtualAddress),
    #[error("address error at {0}")]
    AddressError(VirtualAddress),
    #[error("write to read-only page at {0}")]
    ReadOnly(VirtualAddress),
    #[error("no page table published")]
    NoPageTable,
}

/// Simulated machine with a software-walked flat page table.
#[derive(Debug)]
pub struct SimMachine {
    memory: Vec<u8>,
    registers: [u32; NUM_TOTAL_REGS],
    reference_bits: Vec<bool>,
    page_size: PageSize,
    page_table: Option<PageTableHandle>,
}

impl SimMachine {
    #[must_use]
    pub fn new(page_size: PageSize, num_frames: usize) -> Self {
        Self {
            memory: vec![0; page_size.bytes() * num_frames],
            registers: [0; NUM_TOTAL_REGS],
            reference_bits: vec![false; num_frames],
            page_size,
            page_table: None,
        }
    }

    /// # Errors
    /// If `config` does not validate.
    pub fn from_config(config: &MemoryConfig) -> Result<Self, ConfigError> {
        let page_size = config.validate()?;
        Ok(Self::new(page_size, config.num_frames))
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Translate `va` through the published page table.
    ///
    /// Sets the entry's referenced bit and the frame's reference bit, and
    /// the dirty bit on writes.
    ///
    /// # Errors
    /// [`Exception::PageFault`] for an invalid entry; [`Exception::AddressError`]
    /// beyond the published length; [`Exception::ReadOnly`] when writing a
    /// read-only page.
    pub fn translate(&mut self, va: VirtualAddress, writing: bool) -> Result<usize, Exception> {
        let handle = self.page_table.as_ref().ok_or(Exception::NoPageTable)?;
        let table = handle.upgrade().ok_or(Exception::NoPageTable)?;
        let (vpn, offset) = va.split(self.page_size);
        if vpn.as_usize() >= handle.len() {
            return Err(Exception::AddressError(va));
        }

        let mut table = table.lock();
        let entry = table.get_mut(vpn).ok_or(Exception::AddressError(va))?;
        let frame = entry.frame().ok_or(Exception::PageFault(va))?;
        if writing && entry.is_read_only() {
            return Err(Exception::ReadOnly(va));
        }

        entry.bits_mut().set_referenced(true);
        if writing {
            entry.bits_mut().set_dirty(true);
        }
        if let Some(bit) = self.reference_bits.get_mut(frame.as_usize()) {
            *bit = true;
        }
        Ok(frame.base(self.page_size) + offset)
    }

    /// Load one byte from user memory.
    ///
    /// # Errors
    /// Any translation exception.
    pub fn read_byte(&mut self, va: VirtualAddress) -> Result<u8, Exception> {
        let pa = self.translate(va, false)?;
        self.memory
            .get(pa)
            .copied()
            .ok_or(Exception::AddressError(va))
    }

    /// Store one byte to user memory.
    ///
    /// # Errors
    /// Any translation exception.
    pub fn write_byte(&mut self, va: VirtualAddress, value: u8) -> Result<(), Exception> {
        let pa = self.translate(va, true)?;
        let byte = self.memory.get_mut(pa).ok_or(Exception::AddressError(va))?;
        *byte = value;
        Ok(())
    }
}

impl ReferenceBits for SimMachine {
    fn frame_count(&self) -> usize {
        self.reference_bits.len()
    }

    fn is_referenced(&self, frame: FrameNumber) -> bool {
        self.reference_bits
            .get(frame.as_usize())
            .copied()
            .unwrap_or(false)
    }

    fn set_referenced(&mut self, frame: FrameNumber, referenced: bool) {
        if let Some(bit) = self.reference_bits.get_mut(frame.as_usize()) {
            *bit = referenced;
        }
    }
}

impl Machine for SimMachine {
    fn main_memory(&self) -> &[u8] {
        &self.memory
    }

    fn main_memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn read_register(&self, index: usize) -> u32 {
        self.registers.get(index).copied().unwrap_or(0)
    }

    fn write_register(&mut self, index: usize, value: u32) {
        if let Some(reg) = self.registers.get_mut(index) {
            *reg = value;
        }
    }

    fn publish_page_table(&mut self, table: Option<PageTableHandle>) {
        self.page_table = table;
    }

    fn page_table(&self) -> Option<&PageTableHandle> {
        self.page_table.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::{PageTable, SharedPageTable};
    use alloc::sync::Arc;
    use kernel_memory_addresses::VirtualPageNumber;
    use spin::Mutex;

    fn machine() -> (SimMachine, SharedPageTable) {
        let ps = PageSize::new(16).unwrap();
        let mut m = SimMachine::new(ps, 4);
        let table: SharedPageTable = Arc::new(Mutex::new(PageTable::new(2)));
        m.publish_page_table(Some(PageTableHandle::new(&table)));
        (m, table)
    }

    #[test]
    fn invalid_page_faults() {
        let (mut m, _table) = machine();
        assert_eq!(
            m.read_byte(VirtualAddress::new(3)),
            Err(Exception::PageFault(VirtualAddress::new(3)))
        );
        assert_eq!(
            m.read_byte(VirtualAddress::new(40)),
            Err(Exception::AddressError(VirtualAddress::new(40)))
        );
    }

    #[test]
    fn write_sets_dirty_and_reference_bits() {
        let (mut m, table) = machine();
        table
            .lock()
            .get_mut(VirtualPageNumber::new(1))
            .unwrap()
            .map(FrameNumber::new(2));

        m.write_byte(VirtualAddress::new(17), 0xab).unwrap();
        assert_eq!(m.main_memory()[2 * 16 + 1], 0xab);
        assert!(m.is_referenced(FrameNumber::new(2)));

        let entry = *table.lock().get(VirtualPageNumber::new(1)).unwrap();
        assert!(entry.is_dirty());
        assert!(entry.is_referenced());
    }

    #[test]
    fn dropped_table_is_not_translated() {
        let (mut m, table) = machine();
        drop(table);
        assert_eq!(
            m.read_byte(VirtualAddress::new(0)),
            Err(Exception::NoPageTable)
        );
    }
}
