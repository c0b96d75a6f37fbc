//! Drives the demand-paging memory manager through a process lifecycle:
//! load, touch every page, fork with a shared region, tear down, and report
//! the paging statistics.

mod logger;

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use kernel_alloc::{IoDelay, Vmm};
use kernel_info::config::{MemoryConfig, ReplacementKind};
use kernel_info::memory::{NUM_PHYS_PAGES, PAGE_SIZE, USER_STACK_SIZE};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{MemFileSystem, NoffHeader, ProcessId, Segment, SimMachine};
use logger::StderrLogger;
use std::fs;
use std::path::PathBuf;

const SYNTHETIC_NAME: &str = "synthetic";

/// Run a NOFF program through the virtual memory simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NOFF executable to load (omit with --synthesize)
    program: Option<PathBuf>,

    /// Page replacement policy (none, random, clock)
    #[arg(short, long, default_value = "clock")]
    policy: ReplacementKind,

    /// Number of physical frames
    #[arg(short, long, default_value_t = NUM_PHYS_PAGES)]
    frames: usize,

    /// Bytes per page
    #[arg(long, default_value_t = PAGE_SIZE)]
    page_size: usize,

    /// Bytes of user stack appended to the image
    #[arg(long, default_value_t = USER_STACK_SIZE)]
    stack: usize,

    /// Seed for the random policy
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of children to fork
    #[arg(long, default_value_t = 2)]
    forks: u32,

    /// Bytes of shared memory to add before forking
    #[arg(long, default_value_t = 256)]
    shared: usize,

    /// Build an in-memory program with this many bytes of code instead of
    /// loading one from disk
    #[arg(long)]
    synthesize: Option<u32>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    StderrLogger::new(StderrLogger::level_for(args.verbose))
        .init()
        .context("installing logger")?;

    let (name, files) = load_program(&args)?;
    let config = MemoryConfig {
        page_size: args.page_size,
        num_frames: args.frames,
        user_stack_size: args.stack,
        replacement: args.policy,
        random_seed: args.seed,
        ..MemoryConfig::default()
    };
    let machine = SimMachine::from_config(&config).context("invalid memory configuration")?;
    let mut vmm = Vmm::new(config, machine, files).context("creating memory manager")?;

    let parent = ProcessId::new(1);
    vmm.create(parent, &name)
        .with_context(|| format!("loading {name}"))?;
    vmm.init_registers(parent)?;
    vmm.switch_to(parent)?;
    let size = vmm.space(parent)?.size_bytes();
    println!(
        "{name}: {} pages of {} ({} frames, {} replacement)",
        vmm.space(parent)?.num_pages(),
        vmm.page_size(),
        args.frames,
        args.policy
    );

    let mut delay = touch_every_page(&mut vmm, size)?;

    let shared_base = if args.shared > 0 {
        let base = vmm.extend_shared(parent, args.shared)?;
        println!("shared region of {} bytes at {base}", args.shared);
        Some(base)
    } else {
        None
    };

    let children: Vec<ProcessId> = (0..args.forks).map(|i| ProcessId::new(i + 2)).collect();
    for &child in &children {
        vmm.switch_to(parent)?;
        delay += vmm.fork(parent, child)?;

        vmm.switch_to(child)?;
        let mut first = vec![0u8; 16.min(size)];
        delay += vmm.read_user(VirtualAddress::zero(), &mut first)?;
        if let Some(base) = shared_base {
            delay += vmm.write_user(slot(base, child)?, &child.as_u32().to_le_bytes())?;
        }
    }

    if let Some(base) = shared_base {
        vmm.switch_to(parent)?;
        for &child in &children {
            let mut word = [0u8; 4];
            delay += vmm.read_user(slot(base, child)?, &mut word)?;
            ensure!(
                u32::from_le_bytes(word) == child.as_u32(),
                "{child}'s write to the shared region is not visible to {parent}"
            );
        }
        println!("shared region consistent across {} processes", children.len() + 1);
    }

    for pid in children.into_iter().chain([parent]) {
        vmm.destroy(pid)?;
    }
    if vmm.frames().used() != 0 {
        bail!("{} frames still in use after teardown", vmm.frames().used());
    }

    println!("{}", vmm.stats());
    println!("Simulated I/O: {} ticks", delay.ticks());
    Ok(())
}

fn load_program(args: &Args) -> Result<(String, MemFileSystem)> {
    let mut files = MemFileSystem::new();
    if let Some(code_bytes) = args.synthesize {
        files.insert(SYNTHETIC_NAME, synthesize(code_bytes));
        return Ok((SYNTHETIC_NAME.to_string(), files));
    }

    let Some(path) = &args.program else {
        bail!("either a program path or --synthesize is required");
    };
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path.display().to_string();
    files.insert(name.clone(), bytes);
    Ok((name, files))
}

/// Code of `code_bytes` counting bytes, 64 bytes of initialized data and
/// 128 bytes of uninitialized data.
fn synthesize(code_bytes: u32) -> Vec<u8> {
    const INIT: u32 = 64;
    const HEADER: u32 = 40;
    let header = NoffHeader::new(
        Segment::new(0, HEADER, code_bytes),
        Segment::new(code_bytes, HEADER + code_bytes, INIT),
        Segment::new(code_bytes + INIT, 0, 128),
    );
    let mut image = header.to_le_bytes().to_vec();
    image.extend((0..code_bytes + INIT).map(|i| i.to_le_bytes()[0]));
    image
}

/// Read one byte of every page, then mark each with a write.
fn touch_every_page(vmm: &mut Vmm<SimMachine, MemFileSystem>, size: usize) -> Result<IoDelay> {
    let page_size = vmm.page_size().bytes();
    let mut delay = IoDelay::ZERO;
    for start in (0..size).step_by(page_size) {
        let va = VirtualAddress::new(u32::try_from(start)?);
        let mut byte = [0u8];
        delay += vmm.read_user(va, &mut byte)?;
        delay += vmm.write_user(va, &byte)?;
    }
    log::info!(
        "touched {} pages, {} faults so far",
        size / page_size,
        vmm.stats().page_faults
    );
    Ok(delay)
}

fn slot(base: VirtualAddress, child: ProcessId) -> Result<VirtualAddress> {
    base.checked_add((child.as_u32() - 2) * 4)
        .context("shared slot beyond address range")
}
