//! # Frame Allocation and Demand Paging
//!
//! This crate owns the *global* half of the memory system: the pool of
//! physical frames shared by all processes, the policy that chooses which
//! frame to reuse under memory pressure, and the [`Vmm`] coordinator that
//! drives address spaces through their lifecycle.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Memory Manager (Vmm)                 │
//! │    • create / fork / extend_shared / destroy        │
//! │    • page faults and context switches               │
//! │    • statistics and I/O delay accounting            │
//! └───────┬──────────────────────────────┬──────────────┘
//!         │                              │
//! ┌───────▼──────────────┐   ┌───────────▼─────────────┐
//! │  Replacement Policy  │   │  Address Spaces         │
//! │  • no-replacement    │   │  (kernel-vmem)          │
//! │  • random            │   │  • page table           │
//! │  • clock             │   │  • swap store           │
//! └───────┬──────────────┘   └─────────────────────────┘
//!         │
//! ┌───────▼──────────────────────────────────────────────┐
//! │                 Physical Frame Pool                  │
//! │    • free / owned(pid, vpn) / shared(refcount)       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Obtaining a frame
//!
//! Every page load goes through the same path:
//!
//! 1. The policy selects a frame, never the excluded one.
//! 2. If the frame holds another page, that page is saved to *its owner's*
//!    swap store (written only if dirty) and its entry invalidated.
//! 3. The frame is tagged with the requesting process and page, and the
//!    requester's entry is mapped to it.
//!
//! ## Errors
//!
//! All operations return [`VmmError`]. [`VmmError::kind`] separates fatal
//! conditions (bad executable, exhausted frames, broken invariants) from
//! precondition violations by the caller (unknown process, address out of
//! range), so callers can terminate just the offending process.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::Vmm;
//! use kernel_info::config::MemoryConfig;
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::{MemFileSystem, NoffHeader, ProcessId, Segment, SimMachine};
//!
//! let header = NoffHeader::new(Segment::new(0, 40, 4), Segment::default(), Segment::default());
//! let mut image = header.to_le_bytes().to_vec();
//! image.extend_from_slice(b"\x01\x02\x03\x04");
//!
//! let mut files = MemFileSystem::new();
//! files.insert("prog", image);
//!
//! let config = MemoryConfig::default();
//! let machine = SimMachine::from_config(&config).unwrap();
//! let mut vmm = Vmm::new(config, machine, files).unwrap();
//!
//! let pid = ProcessId::new(1);
//! vmm.create(pid, "prog").unwrap();
//! vmm.switch_to(pid).unwrap();
//!
//! let mut buf = [0u8; 4];
//! let delay = vmm.read_user(VirtualAddress::zero(), &mut buf).unwrap();
//! assert_eq!(buf, [1, 2, 3, 4]);
//! assert_eq!(delay.ticks(), 1000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

mod delay;
pub mod frame_pool;
pub mod replacement;
mod stats;
pub mod vmm;

use alloc::string::String;
use kernel_info::config::ConfigError;
use kernel_memory_addresses::{FrameNumber, VirtualPageNumber};
use kernel_vmem::{Exception, NoffError, PageError, ProcessId};

pub use crate::delay::IoDelay;
pub use crate::frame_pool::{FrameOwner, FramePool, FrameSlot};
pub use crate::replacement::{
    ClockReplacement, NoReplacement, RandomReplacement, ReplacementPolicy, policy_for,
};
pub use crate::stats::Statistics;
pub use crate::vmm::Vmm;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("all {frames} frames handed out and replacement is disabled")]
    Exhausted { frames: usize },
    #[error("no evictable frame available")]
    NoVictim,
    #[error("{0} is not privately held by the releasing page")]
    NotOwned(FrameNumber),
    #[error("{0} is not shared")]
    NotShared(FrameNumber),
    #[error("{0} is already in use")]
    InUse(FrameNumber),
    #[error("{0} does not exist")]
    OutOfRange(FrameNumber),
}

/// Whether an error ends the system's ability to run the process or merely
/// rejects the request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Configuration or invariant failure; the process cannot continue.
    Fatal,
    /// The caller asked for something invalid; state is unchanged.
    Precondition,
}

#[derive(Debug, thiserror::Error)]
pub enum VmmError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("machine has {available} bytes of memory, configuration needs {needed}")]
    MachineTooSmall { needed: usize, available: usize },
    #[error("executable {name:?} is not a valid program")]
    BadExecutable {
        name: String,
        #[source]
        source: NoffError,
    },
    #[error("executable {0:?} not found")]
    ExecutableNotFound(String),
    #[error(transparent)]
    Frames(#[from] FrameError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("{0} does not exist")]
    UnknownProcess(ProcessId),
    #[error("{0} already exists")]
    ProcessExists(ProcessId),
    #[error("{vpn} of {pid} is already resident")]
    AlreadyResident {
        pid: ProcessId,
        vpn: VirtualPageNumber,
    },
    #[error("{0} is mapped inconsistently with the frame pool")]
    InconsistentFrame(FrameNumber),
    #[error("address space of {0} bytes exceeds the 32-bit address range")]
    AddressOverflow(usize),
    #[error("no process is running")]
    NoCurrentProcess,
    #[error(transparent)]
    Access(#[from] Exception),
}

impl VmmError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Page(PageError::OutOfRange { .. })
            | Self::UnknownProcess(_)
            | Self::ProcessExists(_)
            | Self::AlreadyResident { .. }
            | Self::NoCurrentProcess
            | Self::Access(_) => ErrorKind::Precondition,
            Self::Config(_)
            | Self::MachineTooSmall { .. }
            | Self::BadExecutable { .. }
            | Self::ExecutableNotFound(_)
            | Self::Frames(_)
            | Self::Page(_)
            | Self::InconsistentFrame(_)
            | Self::AddressOverflow(_) => ErrorKind::Fatal,
        }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}
