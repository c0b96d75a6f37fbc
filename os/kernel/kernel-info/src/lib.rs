//! # Machine and Memory Configuration
//!
//! This crate is the single source of truth for the numbers that describe the
//! emulated machine's memory system: how large a page is, how many physical
//! frames exist, how much stack a user program receives, how long a page
//! transfer takes, and which replacement policy chooses victims when memory
//! is full.
//!
//! ## Architecture
//!
//! ### Compile-Time Defaults ([`memory`])
//! Plain `const` values mirroring the reference machine:
//! * **Page geometry**: [`PAGE_SIZE`](memory::PAGE_SIZE) bytes per page and frame
//! * **Physical memory**: [`NUM_PHYS_PAGES`](memory::NUM_PHYS_PAGES) frames
//! * **User stack**: [`USER_STACK_SIZE`](memory::USER_STACK_SIZE) bytes appended to every image
//! * **Disk latency**: [`PAGE_IO_DELAY_TICKS`](memory::PAGE_IO_DELAY_TICKS) per page transfer
//! * **Register file**: indices of the program counter and stack pointer
//!
//! ### Runtime Configuration ([`config`])
//! [`MemoryConfig`](config::MemoryConfig) carries the values a running
//! memory manager actually uses. Its [`Default`] is built from the constants
//! above; tests and tools override individual fields (small pages, few
//! frames, a particular replacement policy) and call
//! [`validate`](config::MemoryConfig::validate) before use.
//!
//! ```text
//! Physical memory (NUM_PHYS_PAGES × PAGE_SIZE bytes):
//!
//! 0            PAGE_SIZE      2·PAGE_SIZE               N·PAGE_SIZE
//! ┌──────────────┬──────────────┬─────────┬──────────────┐
//! │   frame 0    │   frame 1    │   ...   │  frame N-1   │
//! └──────────────┴──────────────┴─────────┴──────────────┘
//!
//! User address space of one process (page count P):
//!
//! 0                                               P·PAGE_SIZE
//! ┌──────┬───────────┬──────────────┬─────────┬────────┐
//! │ code │ init data │ uninit data  │  stack  │ shared │
//! └──────┴───────────┴──────────────┴─────────┴────────┘
//!                                    ▲ SP = P·PAGE_SIZE - 16
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::config::{MemoryConfig, ReplacementKind};
//!
//! let config = MemoryConfig {
//!     num_frames: 8,
//!     replacement: "clock".parse().unwrap(),
//!     ..MemoryConfig::default()
//! };
//! assert_eq!(config.replacement, ReplacementKind::Clock);
//! assert!(config.validate().is_ok());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod memory;
