//! # Physical Frame Pool
//!
//! One [`FrameSlot`] per physical frame, recording which process and virtual
//! page currently occupy it. The pool is owned by the memory manager and
//! handed by reference to the replacement policy; nothing else mutates it.
//!
//! ```text
//!  slot:   0          1          2            3
//!        ┌──────────┬──────────┬────────────┬──────────┐
//!        │ Owned    │ Free     │ Shared     │ Owned    │
//!        │ pid 1    │          │ pid 1 vpn9 │ pid 2    │
//!        │ vpn 0    │          │ sharers: 2 │ vpn 4    │
//!        └──────────┴──────────┴────────────┴──────────┘
//! ```
//!
//! Shared frames are reference counted: each address space aliasing the
//! frame holds one count, and the frame returns to the pool when the last
//! one is released. Shared frames are never eviction candidates.

use crate::FrameError;
use alloc::vec;
use alloc::vec::Vec;
use core::num::NonZeroU32;
use kernel_memory_addresses::{FrameNumber, VirtualPageNumber};
use kernel_vmem::ProcessId;

/// The page currently held by a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameOwner {
    pub pid: ProcessId,
    pub vpn: VirtualPageNumber,
}

impl FrameOwner {
    #[must_use]
    pub const fn new(pid: ProcessId, vpn: VirtualPageNumber) -> Self {
        Self { pid, vpn }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum FrameSlot {
    #[default]
    Free,
    /// Privately held by one page; may be evicted.
    Owned(FrameOwner),
    /// Aliased by `sharers` address spaces; `owner` allocated it.
    Shared {
        owner: FrameOwner,
        sharers: NonZeroU32,
    },
}

impl FrameSlot {
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// Whether a replacement policy may pick this slot as a victim.
    #[must_use]
    pub const fn is_evictable(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// Fixed array of frame slots.
#[derive(Debug, Clone)]
pub struct FramePool {
    slots: Vec<FrameSlot>,
    used: usize,
}

impl FramePool {
    /// A pool of `frames` free frames.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self {
            slots: vec![FrameSlot::Free; frames],
            used: 0,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Frames not currently free.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn free(&self) -> usize {
        self.slots.len() - self.used
    }

    #[must_use]
    pub fn slot(&self, frame: FrameNumber) -> Option<&FrameSlot> {
        self.slots.get(frame.as_usize())
    }

    /// All slots with their frame numbers.
    pub fn iter(&self) -> impl Iterator<Item = (FrameNumber, &FrameSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| FrameNumber::from_index(i).map(|f| (f, slot)))
    }

    /// Lowest-numbered free frame.
    #[must_use]
    pub fn first_free(&self) -> Option<FrameNumber> {
        self.iter()
            .find(|(_, slot)| slot.is_free())
            .map(|(frame, _)| frame)
    }

    /// Whether `frame` exists and may be chosen as a victim.
    #[must_use]
    pub fn is_evictable(&self, frame: FrameNumber) -> bool {
        self.slot(frame).is_some_and(FrameSlot::is_evictable)
    }

    /// Reserve a free frame for `owner`.
    ///
    /// # Errors
    /// If the frame does not exist or is not free.
    pub fn assign(&mut self, frame: FrameNumber, owner: FrameOwner) -> Result<(), FrameError> {
        let slot = self.slot_mut(frame)?;
        if !slot.is_free() {
            return Err(FrameError::InUse(frame));
        }
        *slot = FrameSlot::Owned(owner);
        self.used += 1;
        Ok(())
    }

    /// Return `frame` to the pool, provided it is privately held by `owner`.
    ///
    /// # Errors
    /// If the frame is free, shared, or held by a different page.
    pub fn release(&mut self, frame: FrameNumber, owner: FrameOwner) -> Result<(), FrameError> {
        let slot = self.slot_mut(frame)?;
        match *slot {
            FrameSlot::Owned(current) if current == owner => {
                *slot = FrameSlot::Free;
                self.used -= 1;
                Ok(())
            }
            _ => Err(FrameError::NotOwned(frame)),
        }
    }

    /// Turn a privately held frame into a shared frame with one sharer.
    ///
    /// # Errors
    /// If the frame is not privately held.
    pub fn mark_shared(&mut self, frame: FrameNumber) -> Result<(), FrameError> {
        let slot = self.slot_mut(frame)?;
        match *slot {
            FrameSlot::Owned(owner) => {
                *slot = FrameSlot::Shared {
                    owner,
                    sharers: NonZeroU32::MIN,
                };
                Ok(())
            }
            _ => Err(FrameError::NotOwned(frame)),
        }
    }

    /// Add one sharer to a shared frame; returns the new count.
    ///
    /// # Errors
    /// If the frame is not shared.
    pub fn share(&mut self, frame: FrameNumber) -> Result<NonZeroU32, FrameError> {
        let slot = self.slot_mut(frame)?;
        match slot {
            FrameSlot::Shared { sharers, .. } => {
                *sharers = sharers.saturating_add(1);
                Ok(*sharers)
            }
            _ => Err(FrameError::NotShared(frame)),
        }
    }

    /// Drop one sharer; frees the frame when none remain.
    ///
    /// Returns `true` if the frame went back to the pool.
    ///
    /// # Errors
    /// If the frame is not shared.
    pub fn release_shared(&mut self, frame: FrameNumber) -> Result<bool, FrameError> {
        let slot = self.slot_mut(frame)?;
        let FrameSlot::Shared { owner, sharers } = *slot else {
            return Err(FrameError::NotShared(frame));
        };
        if let Some(remaining) = NonZeroU32::new(sharers.get() - 1) {
            *slot = FrameSlot::Shared {
                owner,
                sharers: remaining,
            };
            Ok(false)
        } else {
            *slot = FrameSlot::Free;
            self.used -= 1;
            Ok(true)
        }
    }

    fn slot_mut(&mut self, frame: FrameNumber) -> Result<&mut FrameSlot, FrameError> {
        self.slots
            .get_mut(frame.as_usize())
            .ok_or(FrameError::OutOfRange(frame))
    }
}
