mod common;

use common::{config, image, pattern, vmm};
use kernel_alloc::{ErrorKind, FrameSlot, VmmError};
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::{FrameNumber, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{Machine, NoffHeader, PageError, ProcessId, ReferenceBits, Segment};
use proptest::prelude::*;

const PID: ProcessId = ProcessId::new(1);

proptest! {
    #[test]
    fn fresh_address_space_is_all_invalid(pages in 1usize..24, page_size in 17usize..300) {
        // stack of one page, code filling the rest exactly
        let code = vec![0u8; (pages - 1) * page_size];
        let mut vmm = vmm(
            config(page_size, 4, page_size, ReplacementKind::NoReplacement),
            &[("prog", image(&code, &[], 0))],
        );
        vmm.create(PID, "prog").unwrap();

        let space = vmm.space(PID).unwrap();
        prop_assert_eq!(space.num_pages(), pages);
        prop_assert_eq!(space.swap().len(), pages * page_size);
        for (i, entry) in space.snapshot().iter().enumerate() {
            prop_assert_eq!(entry.virtual_page().as_usize(), i);
            prop_assert!(!entry.is_valid());
            prop_assert!(!entry.is_dirty());
            prop_assert!(!entry.is_used_before());
            prop_assert!(!entry.is_shared());
            prop_assert!(!entry.is_read_only());
            prop_assert_eq!(entry.frame(), None);
        }
        prop_assert_eq!(vmm.frames().used(), 0);
    }
}

#[test]
fn fault_loads_code_segment_intersection() {
    // code segment [size=64, vaddr=0, fileOffset=40], page size 64
    let code = pattern(64, 1);
    let exe = image(&code, &[], 0);
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("prog", exe.clone())],
    );
    vmm.create(PID, "prog").unwrap();

    let delay = vmm.page_fault(PID, VirtualAddress::new(10)).unwrap();
    assert_eq!(delay.ticks(), 1000);

    let entry = vmm.space(PID).unwrap().entry(VirtualPageNumber::new(0)).unwrap();
    assert!(entry.is_valid());
    assert!(entry.is_used_before());
    let frame = entry.frame().unwrap();
    assert_eq!(
        &vmm.machine().main_memory()[frame.byte_range(vmm.page_size())],
        &exe[40..104]
    );
    assert_eq!(vmm.stats().page_faults, 1);
    assert!(matches!(
        vmm.frames().slot(frame),
        Some(FrameSlot::Owned(owner)) if owner.pid == PID && owner.vpn == VirtualPageNumber::new(0)
    ));
}

#[test]
fn data_straddling_pages_lands_at_right_offsets() {
    let code = pattern(40, 3);
    let init = pattern(50, 90);
    let exe = image(&code, &init, 30);
    let mut vmm = vmm(
        config(64, 8, 64, ReplacementKind::NoReplacement),
        &[("prog", exe)],
    );
    vmm.create(PID, "prog").unwrap();
    vmm.switch_to(PID).unwrap();

    let mut all = vec![0u8; 120];
    vmm.read_user(VirtualAddress::zero(), &mut all).unwrap();
    assert_eq!(&all[..40], &code[..]);
    assert_eq!(&all[40..90], &init[..]);
    assert!(all[90..].iter().all(|&b| b == 0));
}

#[test]
fn byte_swapped_executable_is_accepted() {
    let mut exe = image(&pattern(8, 0), &[], 0);
    for word in exe[..40].chunks_exact_mut(4) {
        word.reverse();
    }
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("prog", exe)],
    );
    vmm.create(PID, "prog").unwrap();
    vmm.switch_to(PID).unwrap();

    let mut buf = [0u8; 8];
    vmm.read_user(VirtualAddress::zero(), &mut buf).unwrap();
    assert_eq!(buf.to_vec(), pattern(8, 0));
}

#[test]
fn bad_executables_are_fatal() {
    let mut garbage = image(&[1, 2, 3], &[], 0);
    garbage[0] ^= 0xff;
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("garbage", garbage), ("short", vec![0xad, 0xdf])],
    );

    let err = vmm.create(PID, "garbage").unwrap_err();
    assert!(matches!(err, VmmError::BadExecutable { .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);

    let err = vmm.create(PID, "short").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);

    let err = vmm.create(PID, "missing").unwrap_err();
    assert!(matches!(err, VmmError::ExecutableNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[test]
fn caller_mistakes_are_preconditions() {
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("prog", image(&pattern(64, 0), &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();

    // two pages: code + stack
    let err = vmm.page_fault(PID, VirtualAddress::new(128)).unwrap_err();
    assert!(matches!(err, VmmError::Page(PageError::OutOfRange { .. })));
    assert_eq!(err.kind(), ErrorKind::Precondition);

    vmm.page_fault(PID, VirtualAddress::new(0)).unwrap();
    let err = vmm.page_fault(PID, VirtualAddress::new(5)).unwrap_err();
    assert!(matches!(err, VmmError::AlreadyResident { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = vmm.create(PID, "prog").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = vmm.page_fault(ProcessId::new(9), VirtualAddress::new(0)).unwrap_err();
    assert!(matches!(err, VmmError::UnknownProcess(_)));

    let err = vmm.read_user(VirtualAddress::zero(), &mut [0u8; 1]).unwrap_err();
    assert!(matches!(err, VmmError::NoCurrentProcess));
}

#[test]
fn executable_removed_after_create_is_fatal_on_first_fault() {
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("prog", image(&pattern(64, 0), &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();
    assert!(vmm.files_mut().remove("prog"));

    let err = vmm.page_fault(PID, VirtualAddress::new(0)).unwrap_err();
    assert!(matches!(
        err,
        VmmError::Page(PageError::ExecutableUnavailable(ref name)) if name == "prog"
    ));
    assert!(err.is_fatal());

    // nothing of the abandoned fault remains mapped
    let entry = vmm.space(PID).unwrap().entry(VirtualPageNumber::new(0)).unwrap();
    assert!(!entry.is_valid());
    assert!(!entry.is_used_before());
    assert_eq!(vmm.frames().used(), 0);
    assert_eq!(vmm.stats().page_faults, 0);

    vmm.switch_to(PID).unwrap();
    let mut buf = [0xaa; 4];
    assert!(vmm.read_user(VirtualAddress::new(0), &mut buf).is_err());
    assert_eq!(vmm.frames().used(), 0);
}

#[test]
fn image_beyond_32_bit_addresses_is_rejected() {
    let header = NoffHeader::new(
        Segment::new(0, 40, 0xffff_f000),
        Segment::default(),
        Segment::new(0xffff_f000, 0, 0x10_0000),
    );
    let mut vmm = vmm(
        config(4096, 4, 4096, ReplacementKind::NoReplacement),
        &[("big", header.to_le_bytes().to_vec())],
    );

    let err = vmm.create(PID, "big").unwrap_err();
    assert!(matches!(err, VmmError::AddressOverflow(bytes) if bytes > u32::MAX as usize));
    assert!(err.is_fatal());
    assert!(vmm.space(PID).is_err());
}

#[test]
fn registers_and_context_switch() {
    let mut vmm = vmm(
        config(64, 4, 64, ReplacementKind::NoReplacement),
        &[("prog", image(&pattern(100, 0), &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();
    vmm.create(ProcessId::new(2), "prog").unwrap();

    vmm.init_registers(PID).unwrap();
    let machine = vmm.machine();
    assert_eq!(machine.read_register(kernel_vmem::info::PC_REG), 0);
    assert_eq!(machine.read_register(kernel_vmem::info::NEXT_PC_REG), 4);
    // 100 + 64 bytes -> 3 pages of 64
    assert_eq!(machine.read_register(kernel_vmem::info::STACK_REG), 3 * 64 - 16);

    vmm.switch_to(PID).unwrap();
    vmm.write_user(VirtualAddress::new(130), &[7]).unwrap();
    vmm.switch_to(ProcessId::new(2)).unwrap();
    let mut byte = [0u8];
    vmm.read_user(VirtualAddress::new(130), &mut byte).unwrap();
    assert_eq!(byte, [0]);

    vmm.switch_out();
    assert!(vmm.machine().page_table().is_none());
    assert_eq!(vmm.current(), None);
}

#[test]
fn destroy_returns_every_frame() {
    let mut vmm = vmm(
        config(64, 8, 128, ReplacementKind::Clock),
        &[("prog", image(&pattern(128, 0), &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();
    vmm.switch_to(PID).unwrap();
    vmm.write_user(VirtualAddress::zero(), &pattern(256, 4)).unwrap();
    assert_eq!(vmm.frames().used(), 4);

    vmm.destroy(PID).unwrap();
    assert_eq!(vmm.frames().used(), 0);
    assert!(vmm.machine().page_table().is_none());
    assert!(vmm.frames().iter().all(|(_, slot)| slot.is_free()));
    assert!(!vmm.machine().is_referenced(FrameNumber::new(0)));
    assert!(matches!(
        vmm.destroy(PID),
        Err(VmmError::UnknownProcess(_))
    ));
}
