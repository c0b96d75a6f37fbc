//! # Per-Process Virtual Memory
//!
//! Software-managed paging for a simulated MIPS-like machine: a single flat
//! page table per process, demand loading from an executable image, and a
//! per-process swap store holding evicted pages.
//!
//! ## What you get
//! - [`PageEntryBits`]: the packed status word of a page table entry.
//! - [`PageTable`] / [`PageTableEntry`]: the flat table owned by an address space,
//!   and [`PageTableHandle`], the non-owning view the machine translates through.
//! - [`NoffHeader`]: the executable header (magic plus three segments).
//! - [`SwapStore`]: page-granular backing bytes for evicted pages.
//! - [`AddressSpace`]: creation, content population, swap save, extension and
//!   register setup for one process.
//! - The two external collaborators as traits: [`FileSystem`] for reading
//!   executables and [`Machine`] for physical memory, registers and the
//!   published page table; plus in-memory implementations ([`MemFileSystem`],
//!   [`SimMachine`]).
//!
//! Frame allocation and replacement are *not* decided here; the address space
//! only installs the frames it is given. See the `kernel-alloc` crate.
//!
//! ## Translation
//!
//! ```text
//!     virtual address
//! ┌──────────────────┬──────────┐
//! │   page number    │  offset  │     vpn = va / page_size
//! └────────┬─────────┴────┬─────┘     off = va % page_size
//!          │              │
//!          ▼              │
//!  ┌───────────────┐      │
//!  │ page table    │      │
//!  │  [vpn] ───────┼─► frame ──► frame·page_size + off ──► main memory
//!  └───────────────┘
//!     valid == false  ──►  page fault
//! ```
//!
//! ### Entry states
//!
//! | valid | used before | Meaning | On fault |
//! |:-----:|:-----------:|:--------|:---------|
//! | no  | no  | never touched | fill from executable (or zero) |
//! | yes | yes | resident | no fault |
//! | no  | yes | evicted | fill from swap store |

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod address_space;
pub mod filesys;
pub mod machine;
pub mod noff;
mod page_entry_bits;
pub mod page_table;
mod process;
pub mod swap;

pub use crate::address_space::{AddressSpace, Eviction, PageError, PopulateSource};
pub use crate::filesys::{FileSystem, MemFile, MemFileSystem, OpenFile};
pub use crate::machine::{Exception, Machine, ReferenceBits, SimMachine};
pub use crate::noff::{NoffError, NoffHeader, Segment};
pub use crate::page_entry_bits::{NO_FRAME, PageEntryBits};
pub use crate::page_table::{PageTable, PageTableEntry, PageTableHandle, SharedPageTable};
pub use crate::process::ProcessId;
pub use crate::swap::SwapStore;

/// Re-export constants as info module.
pub use kernel_info::memory as info;
