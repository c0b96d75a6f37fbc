//! # Virtual Memory Address Types
//!
//! Strongly typed wrappers for the numbers that flow through demand paging:
//! user virtual addresses, virtual page numbers, physical frame numbers and the
//! page size that relates them.
//!
//! ## Overview
//!
//! The emulated machine uses a flat, 32-bit user address space and a small,
//! fixed array of physical frames. Page size is a *runtime* property of the
//! machine configuration (tests commonly use 64-byte pages, the default is
//! 128 bytes), so unlike hardware paging code there is no marker type per
//! page size; instead every conversion takes a [`PageSize`] value.
//!
//! | Type | Wraps | Description |
//! |------|-------|-------------|
//! | [`VirtualAddress`] | `u32` | A byte address in a process' address space. |
//! | [`VirtualPageNumber`] | `u32` | Index of a page in a process' page table. |
//! | [`FrameNumber`] | `u32` | Index of a frame in physical memory. |
//! | [`PageSize`] | `NonZeroUsize` | Bytes per page and per frame. |
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let page_size = PageSize::new(64).unwrap();
//! let va = VirtualAddress::new(200);
//!
//! let (vpn, offset) = va.split(page_size);
//! assert_eq!(vpn, VirtualPageNumber::new(3));
//! assert_eq!(offset, 8);
//! assert_eq!(vpn.base(page_size).as_u32() + 8, 200);
//!
//! let frame = FrameNumber::new(2);
//! assert_eq!(frame.byte_range(page_size), 128..192);
//! ```
//!
//! ## Design Notes
//!
//! - All types are `#[repr(transparent)]`, `Copy`, `Ord` and `Hash`, so they
//!   can be used as map keys and stored in page table entries cheaply.
//! - Virtual pages and physical frames are deliberately distinct types; the
//!   only bridge between them is a page table entry.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_frame;
mod virtual_address;
mod virtual_page;

pub use page_size::PageSize;
pub use physical_frame::FrameNumber;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPageNumber;
