//! # NOFF Executable Header
//!
//! The executable format is a fixed 40-byte header followed by raw segment
//! bytes. The header is a magic number and three segment descriptors, all
//! 32-bit words:
//!
//! ```text
//! offset  field
//! 0x00    magic            (0x00badfad)
//! 0x04    code.virtual_addr
//! 0x08    code.file_offset
//! 0x0c    code.size
//! 0x10    init_data.virtual_addr
//! 0x14    init_data.file_offset
//! 0x18    init_data.size
//! 0x1c    uninit_data.virtual_addr
//! 0x20    uninit_data.file_offset
//! 0x24    uninit_data.size
//! ```
//!
//! Words are little-endian. A header whose magic only matches after swapping
//! each word's byte order was written on a big-endian host; all of its words
//! are swapped before use.

use crate::info::NOFF_MAGIC;
use core::ops::Range;

/// Size of the encoded header in bytes.
pub const NOFF_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NoffError {
    #[error("executable header truncated: got {0} of 40 bytes")]
    Truncated(usize),
    #[error("bad executable magic {0:#010x}")]
    BadMagic(u32),
    #[error("program needs {0} bytes of address space, beyond the 32-bit range")]
    TooLarge(usize),
}

/// One contiguous region of the program image.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Segment {
    /// First virtual address the segment occupies.
    pub virtual_addr: u32,
    /// Where the segment's bytes start in the executable file.
    pub file_offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl Segment {
    #[must_use]
    pub const fn new(virtual_addr: u32, file_offset: u32, size: u32) -> Self {
        Self {
            virtual_addr,
            file_offset,
            size,
        }
    }

    /// Virtual byte range `[virtual_addr, virtual_addr + size)`.
    #[must_use]
    pub const fn virtual_range(&self) -> Range<usize> {
        let start = self.virtual_addr as usize;
        start..start + self.size as usize
    }

    /// Overlap of this segment with the virtual byte range `page`.
    ///
    /// Returns `(file_offset, page_offset, len)`: `len` bytes starting at
    /// `file_offset` in the executable belong at `page_offset` inside the page.
    ///
    /// ```rust
    /// # use kernel_vmem::Segment;
    /// let code = Segment::new(0, 40, 100);
    /// assert_eq!(code.intersect(&(64..128)), Some((104, 0, 36)));
    /// assert_eq!(code.intersect(&(128..192)), None);
    /// ```
    #[must_use]
    pub fn intersect(&self, page: &Range<usize>) -> Option<(usize, usize, usize)> {
        let segment = self.virtual_range();
        let start = segment.start.max(page.start);
        let end = segment.end.min(page.end);
        if start >= end {
            return None;
        }
        let file_offset = self.file_offset as usize + (start - segment.start);
        Some((file_offset, start - page.start, end - start))
    }

    fn swapped(self) -> Self {
        Self {
            virtual_addr: self.virtual_addr.swap_bytes(),
            file_offset: self.file_offset.swap_bytes(),
            size: self.size.swap_bytes(),
        }
    }
}

/// Parsed executable header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NoffHeader {
    pub magic: u32,
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    #[must_use]
    pub const fn new(code: Segment, init_data: Segment, uninit_data: Segment) -> Self {
        Self {
            magic: NOFF_MAGIC,
            code,
            init_data,
            uninit_data,
        }
    }

    /// Decode the first [`NOFF_HEADER_SIZE`] bytes of `bytes`.
    ///
    /// # Errors
    /// [`NoffError::Truncated`] if fewer bytes are available and
    /// [`NoffError::BadMagic`] if the magic matches in neither byte order.
    pub fn parse(bytes: &[u8]) -> Result<Self, NoffError> {
        let Some(raw) = bytes.get(..NOFF_HEADER_SIZE) else {
            return Err(NoffError::Truncated(bytes.len()));
        };

        let mut words = [0u32; NOFF_HEADER_SIZE / 4];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let segment = |i: usize| Segment::new(words[i], words[i + 1], words[i + 2]);
        let header = Self {
            magic: words[0],
            code: segment(1),
            init_data: segment(4),
            uninit_data: segment(7),
        };

        if header.magic == NOFF_MAGIC {
            Ok(header)
        } else if header.magic.swap_bytes() == NOFF_MAGIC {
            log::debug!("executable header is byte-swapped");
            Ok(header.swapped())
        } else {
            Err(NoffError::BadMagic(header.magic))
        }
    }

    /// Encode as little-endian header bytes.
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; NOFF_HEADER_SIZE] {
        let words = [
            self.magic,
            self.code.virtual_addr,
            self.code.file_offset,
            self.code.size,
            self.init_data.virtual_addr,
            self.init_data.file_offset,
            self.init_data.size,
            self.uninit_data.virtual_addr,
            self.uninit_data.file_offset,
            self.uninit_data.size,
        ];
        let mut out = [0u8; NOFF_HEADER_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Bytes of program image: code, initialized and uninitialized data.
    #[must_use]
    pub const fn image_size(&self) -> usize {
        (self.code.size as usize)
            .saturating_add(self.init_data.size as usize)
            .saturating_add(self.uninit_data.size as usize)
    }

    /// Segments whose bytes come from the executable file.
    #[must_use]
    pub const fn loadable(&self) -> [Segment; 2] {
        [self.code, self.init_data]
    }

    fn swapped(self) -> Self {
        Self {
            magic: self.magic.swap_bytes(),
            code: self.code.swapped(),
            init_data: self.init_data.swapped(),
            uninit_data: self.uninit_data.swapped(),
        }
    }
}
