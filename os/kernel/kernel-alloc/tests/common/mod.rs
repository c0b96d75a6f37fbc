#![allow(dead_code)]

use kernel_alloc::Vmm;
use kernel_info::config::{MemoryConfig, ReplacementKind};
use kernel_vmem::noff::NOFF_HEADER_SIZE;
use kernel_vmem::{MemFileSystem, NoffHeader, Segment, SimMachine};

pub type TestVmm = Vmm<SimMachine, MemFileSystem>;

/// Executable with `code` at virtual address 0, `init` right after it and
/// `bss` bytes of uninitialized data after that.
pub fn image(code: &[u8], init: &[u8], bss: u32) -> Vec<u8> {
    let code_len = u32::try_from(code.len()).unwrap();
    let init_len = u32::try_from(init.len()).unwrap();
    let header_len = u32::try_from(NOFF_HEADER_SIZE).unwrap();
    let header = NoffHeader::new(
        Segment::new(0, header_len, code_len),
        Segment::new(code_len, header_len + code_len, init_len),
        Segment::new(code_len + init_len, 0, bss),
    );
    let mut bytes = header.to_le_bytes().to_vec();
    bytes.extend_from_slice(code);
    bytes.extend_from_slice(init);
    bytes
}

/// Distinguishable bytes for page-sized regions.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).unwrap().wrapping_add(seed))
        .collect()
}

pub fn config(
    page_size: usize,
    frames: usize,
    stack: usize,
    replacement: ReplacementKind,
) -> MemoryConfig {
    MemoryConfig {
        page_size,
        num_frames: frames,
        user_stack_size: stack,
        replacement,
        random_seed: 0x5eed,
        ..MemoryConfig::default()
    }
}

pub fn vmm(config: MemoryConfig, programs: &[(&str, Vec<u8>)]) -> TestVmm {
    let mut files = MemFileSystem::new();
    for (name, bytes) in programs {
        files.insert(*name, bytes.clone());
    }
    let machine = SimMachine::from_config(&config).unwrap();
    Vmm::new(config, machine, files).unwrap()
}
