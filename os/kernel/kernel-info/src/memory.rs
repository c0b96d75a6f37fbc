//! # Memory Layout

/// Bytes per virtual page and per physical frame.
pub const PAGE_SIZE: usize = 128;

/// Number of physical frames in main memory.
pub const NUM_PHYS_PAGES: usize = 32;

/// Bytes of stack appended after the uninitialized data of every program.
pub const USER_STACK_SIZE: usize = 1024;

/// Simulated ticks a single page transfer to or from disk takes.
pub const PAGE_IO_DELAY_TICKS: u64 = 1000;

/// Magic number at the start of every executable image.
pub const NOFF_MAGIC: u32 = 0x00ba_dfad;

/// The initial stack pointer sits this many bytes below the end of the
/// address space so that an off-by-one access does not fault.
pub const STACK_GUARD_BYTES: usize = 16;

/// Number of user-visible machine registers.
pub const NUM_TOTAL_REGS: usize = 40;

/// Stack pointer register.
pub const STACK_REG: usize = 29;

/// Current program counter.
pub const PC_REG: usize = 34;

/// Next program counter, for branch delay.
pub const NEXT_PC_REG: usize = 35;

/// Size of one machine instruction in bytes.
pub const INSTRUCTION_SIZE: u32 = 4;

const _: () = {
    assert!(PAGE_SIZE > 0);
    assert!(NUM_PHYS_PAGES > 0);
    assert!(USER_STACK_SIZE > STACK_GUARD_BYTES);
    assert!(STACK_REG < NUM_TOTAL_REGS);
    assert!(PC_REG < NUM_TOTAL_REGS);
    assert!(NEXT_PC_REG < NUM_TOTAL_REGS);
};
