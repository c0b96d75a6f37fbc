use bitfield_struct::bitfield;
use kernel_memory_addresses::FrameNumber;

/// Frame field value of an entry that maps no frame.
pub const NO_FRAME: u32 = u32::MAX;

/// Status word of a single page table entry in its raw bitfield form.
///
/// The machine's translation path reads `valid`, `read_only` and the frame
/// field, and sets `referenced` and `dirty` as a side effect of accesses. The
/// remaining bits are bookkeeping for the memory manager.
///
/// ### Bit layout
///
/// | Bits   | Name          | Meaning |
/// |--------|---------------|---------|
/// | 0      | `valid`       | Page is resident; the frame field is meaningful |
/// | 1      | `referenced`  | Accessed since the bit was last cleared |
/// | 2      | `dirty`       | Written since last load or swap save |
/// | 3      | `read_only`   | Writes trap (reserved for code protection) |
/// | 4      | `shared`      | Frame is aliased by other address spaces |
/// | 5      | `used_before` | Populated at least once since process start |
/// | 6-31   | reserved      | |
/// | 32-63  | `frame_bits`  | Physical frame number, or [`NO_FRAME`] |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::{NO_FRAME, PageEntryBits};
/// # use kernel_memory_addresses::FrameNumber;
/// let mut e = PageEntryBits::new().with_frame_bits(NO_FRAME);
/// assert_eq!(e.frame(), None);
///
/// e.set_frame(FrameNumber::new(7));
/// e.set_valid(true);
/// assert_eq!(e.frame(), Some(FrameNumber::new(7)));
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Page is resident in a physical frame.
    pub valid: bool,

    /// Use bit; set by the machine on every translation through this entry.
    pub referenced: bool,

    /// Set by the machine on every write through this entry.
    pub dirty: bool,

    /// Writes through this entry raise a read-only exception.
    pub read_only: bool,

    /// The frame is aliased with another address space's page and is not
    /// privately owned.
    pub shared: bool,

    /// The page has been populated since process start; a fault on an
    /// invalid, used page reloads from swap instead of the executable.
    pub used_before: bool,

    #[bits(26)]
    __: u32,

    /// Raw physical frame number.
    pub frame_bits: u32,
}

impl PageEntryBits {
    /// The mapped frame, if the entry is valid.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Option<FrameNumber> {
        if self.valid() && self.frame_bits() != NO_FRAME {
            Some(FrameNumber::new(self.frame_bits()))
        } else {
            None
        }
    }

    #[inline]
    pub fn set_frame(&mut self, frame: FrameNumber) {
        self.set_frame_bits(frame.as_u32());
    }

    #[inline]
    pub fn clear_frame(&mut self) {
        self.set_frame_bits(NO_FRAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let e = PageEntryBits::new()
            .with_dirty(true)
            .with_shared(true)
            .with_frame_bits(3);
        assert!(!e.valid());
        assert!(e.dirty());
        assert!(e.shared());
        assert!(!e.used_before());
        assert_eq!(e.frame_bits(), 3);
        assert_eq!(e.into_bits() >> 32, 3);
    }

    #[test]
    fn invalid_entry_reports_no_frame() {
        let e = PageEntryBits::new().with_frame_bits(5);
        assert_eq!(e.frame(), None);
        assert_eq!(e.with_valid(true).frame(), Some(FrameNumber::new(5)));
    }
}
