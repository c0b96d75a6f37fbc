mod common;

use common::{config, image, pattern, vmm};
use kernel_alloc::{
    ClockReplacement, ErrorKind, FrameError, FrameOwner, FramePool, RandomReplacement,
    ReplacementPolicy, VmmError,
};
use kernel_info::config::ReplacementKind;
use kernel_memory_addresses::{FrameNumber, PageSize, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{ProcessId, ReferenceBits, SimMachine};
use proptest::prelude::*;
use std::collections::BTreeSet;

const PID: ProcessId = ProcessId::new(1);

fn full_pool(n: usize) -> FramePool {
    let mut pool = FramePool::new(n);
    for i in 0..n {
        let frame = FrameNumber::from_index(i).unwrap();
        pool.assign(
            frame,
            FrameOwner::new(PID, VirtualPageNumber::new(frame.as_u32())),
        )
        .unwrap();
    }
    pool
}

fn machine_with_bits(bits: &[bool]) -> SimMachine {
    let mut machine = SimMachine::new(PageSize::new(16).unwrap(), bits.len());
    for (i, &bit) in bits.iter().enumerate() {
        machine.set_referenced(FrameNumber::from_index(i).unwrap(), bit);
    }
    machine
}

#[test]
fn no_replacement_fills_pool_exactly_once() {
    // 4 frames, program of 5 pages
    let mut vmm = vmm(
        config(32, 4, 32, ReplacementKind::NoReplacement),
        &[("prog", image(&pattern(128, 0), &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();
    assert_eq!(vmm.space(PID).unwrap().num_pages(), 5);

    let mut frames = BTreeSet::new();
    for page in 0..4u32 {
        vmm.page_fault(PID, VirtualAddress::new(page * 32)).unwrap();
        let entry = vmm
            .space(PID)
            .unwrap()
            .entry(VirtualPageNumber::new(page))
            .unwrap();
        let frame = entry.frame().unwrap();
        assert!(frame.as_usize() < 4);
        assert!(frames.insert(frame));
    }

    let err = vmm.page_fault(PID, VirtualAddress::new(4 * 32)).unwrap_err();
    assert!(matches!(
        err,
        VmmError::Frames(FrameError::Exhausted { frames: 4 })
    ));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

fn swap_round_trip(kind: ReplacementKind) {
    // 8 pages, 3 frames
    let code = pattern(64, 9);
    let mut vmm = vmm(
        config(32, 3, 192, kind),
        &[("prog", image(&code, &[], 0))],
    );
    vmm.create(PID, "prog").unwrap();
    vmm.switch_to(PID).unwrap();
    assert_eq!(vmm.space(PID).unwrap().num_pages(), 8);

    let mut back = vec![0u8; 64];
    vmm.read_user(VirtualAddress::zero(), &mut back).unwrap();
    assert_eq!(back, code);

    let written: Vec<Vec<u8>> = (0..6u8).map(|i| pattern(32, i * 17)).collect();
    for (i, bytes) in written.iter().enumerate() {
        let va = VirtualAddress::new(64 + 32 * u32::try_from(i).unwrap());
        vmm.write_user(va, bytes).unwrap();
    }
    assert!(vmm.stats().evictions > 0);
    assert!(vmm.stats().swap_writes > 0);
    assert!(vmm.frames().used() <= 3);

    for (i, bytes) in written.iter().enumerate() {
        let va = VirtualAddress::new(64 + 32 * u32::try_from(i).unwrap());
        let mut back = vec![0u8; 32];
        vmm.read_user(va, &mut back).unwrap();
        assert_eq!(&back, bytes, "page {} after eviction", i + 2);
    }

    // clean code pages were evicted without a write and come back intact
    back.fill(0);
    vmm.read_user(VirtualAddress::zero(), &mut back).unwrap();
    assert_eq!(back, code);
}

#[test]
fn clock_preserves_evicted_dirty_pages() {
    swap_round_trip(ReplacementKind::Clock);
}

#[test]
fn random_preserves_evicted_dirty_pages() {
    swap_round_trip(ReplacementKind::Random);
}

#[test]
fn eviction_targets_other_processes_too() {
    let mut vmm = vmm(
        config(32, 2, 32, ReplacementKind::Clock),
        &[("prog", image(&pattern(32, 0), &[], 0))],
    );
    let other = ProcessId::new(2);
    vmm.create(PID, "prog").unwrap();
    vmm.create(other, "prog").unwrap();

    vmm.switch_to(PID).unwrap();
    vmm.write_user(VirtualAddress::new(32), &[0xaa; 32]).unwrap();
    vmm.switch_to(other).unwrap();
    vmm.write_user(VirtualAddress::new(32), &[0xbb; 32]).unwrap();
    vmm.write_user(VirtualAddress::new(0), &[0xcc; 4]).unwrap();

    vmm.switch_to(PID).unwrap();
    let mut back = [0u8; 32];
    vmm.read_user(VirtualAddress::new(32), &mut back).unwrap();
    assert_eq!(back, [0xaa; 32]);
}

proptest! {
    #[test]
    fn random_never_returns_excluded(n in 2usize..16, exclude in 0usize..16, seed in any::<u64>()) {
        let exclude = FrameNumber::from_index(exclude % n).unwrap();
        let pool = full_pool(n);
        let mut refs = machine_with_bits(&vec![false; n]);
        let mut policy = RandomReplacement::seeded(seed);
        for _ in 0..32 {
            let frame = policy.select(&pool, &mut refs, Some(exclude)).unwrap();
            prop_assert_ne!(frame, exclude);
            prop_assert!(frame.as_usize() < n);
        }
    }

    #[test]
    fn clock_never_returns_excluded(
        bits in prop::collection::vec(any::<bool>(), 2..16),
        excludes in prop::collection::vec(0usize..16, 1..24),
    ) {
        let n = bits.len();
        let pool = full_pool(n);
        let mut refs = machine_with_bits(&bits);
        let mut clock = ClockReplacement::new();
        for exclude in excludes {
            let exclude = FrameNumber::from_index(exclude % n).unwrap();
            let frame = clock.select(&pool, &mut refs, Some(exclude)).unwrap();
            prop_assert_ne!(frame, exclude);
        }
    }

    #[test]
    fn clock_first_pass_prefers_clear_bits(bits in prop::collection::vec(any::<bool>(), 1..16)) {
        let n = bits.len();
        let pool = full_pool(n);
        let mut refs = machine_with_bits(&bits);
        let mut clock = ClockReplacement::new();

        let victim = clock.select(&pool, &mut refs, None).unwrap().as_usize();
        match bits.iter().position(|&b| !b) {
            Some(first_clear) => {
                // the first clear frame wins; every set bit passed on the way is cleared
                prop_assert_eq!(victim, first_clear);
                for i in 0..first_clear {
                    prop_assert!(!refs.is_referenced(FrameNumber::from_index(i).unwrap()));
                }
                for i in first_clear + 1..n {
                    prop_assert_eq!(refs.is_referenced(FrameNumber::from_index(i).unwrap()), bits[i]);
                }
            }
            None => {
                // a full rotation clears everything, then frame 0 is taken
                prop_assert_eq!(victim, 0);
                for i in 1..n {
                    prop_assert!(!refs.is_referenced(FrameNumber::from_index(i).unwrap()));
                }
            }
        }
        prop_assert!(refs.is_referenced(FrameNumber::from_index(victim).unwrap()));
        prop_assert_eq!(clock.hand(), (victim + 1) % n);
    }
}
