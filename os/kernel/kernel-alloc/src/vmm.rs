//! Memory manager coordinating address spaces, the frame pool and the
//! replacement policy.
//!
//! One [`Vmm`] serves every process on the machine. It exclusively owns the
//! frame pool and all address spaces, so a page fault in one process can
//! evict a page of another process and save it to that process' swap store
//! without any shared mutable state.
//!
//! # Example
//! ```ignore
//! let mut vmm = Vmm::new(config, machine, files)?;
//! vmm.create(parent, "halt")?;
//! let delay = vmm.fork(parent, child)?;
//! scheduler.sleep_until(delay.wake_at(now));
//! ```

use crate::delay::IoDelay;
use crate::frame_pool::{FrameOwner, FramePool, FrameSlot};
use crate::replacement::{ReplacementPolicy, policy_for};
use crate::stats::Statistics;
use crate::{FrameError, VmmError};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;
use kernel_info::config::MemoryConfig;
use kernel_memory_addresses::{FrameNumber, PageSize, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{
    AddressSpace, Exception, FileSystem, Machine, NoffError, PageError, PageTableEntry, ProcessId,
    SimMachine,
};
use log::{debug, trace, warn};

/// Demand-paging memory manager.
pub struct Vmm<M: Machine, F: FileSystem> {
    config: MemoryConfig,
    page_size: PageSize,
    machine: M,
    files: F,
    frames: FramePool,
    policy: Box<dyn ReplacementPolicy>,
    spaces: BTreeMap<ProcessId, AddressSpace>,
    current: Option<ProcessId>,
    stats: Statistics,
}

impl<M: Machine, F: FileSystem> Vmm<M, F> {
    /// Memory manager using the policy named in `config`.
    ///
    /// # Errors
    /// If `config` is invalid or `machine` has less memory than it describes.
    pub fn new(config: MemoryConfig, machine: M, files: F) -> Result<Self, VmmError> {
        let policy = policy_for(config.replacement, config.random_seed);
        Self::with_policy(config, machine, files, policy)
    }

    /// Memory manager with an explicit replacement policy.
    ///
    /// # Errors
    /// If `config` is invalid or `machine` has less memory than it describes.
    pub fn with_policy(
        config: MemoryConfig,
        machine: M,
        files: F,
        policy: Box<dyn ReplacementPolicy>,
    ) -> Result<Self, VmmError> {
        let page_size = config.validate()?;
        let needed = config.memory_bytes();
        let available = machine.main_memory().len();
        if available < needed || machine.frame_count() < config.num_frames {
            return Err(VmmError::MachineTooSmall { needed, available });
        }

        debug!(
            "vmm: {} frames of {page_size}, {} replacement",
            config.num_frames,
            policy.kind()
        );
        Ok(Self {
            frames: FramePool::new(config.num_frames),
            config,
            page_size,
            machine,
            files,
            policy,
            spaces: BTreeMap::new(),
            current: None,
            stats: Statistics::default(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub const fn machine(&self) -> &M {
        &self.machine
    }

    pub const fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    #[must_use]
    pub const fn files(&self) -> &F {
        &self.files
    }

    pub const fn files_mut(&mut self) -> &mut F {
        &mut self.files
    }

    #[must_use]
    pub const fn frames(&self) -> &FramePool {
        &self.frames
    }

    #[must_use]
    pub const fn stats(&self) -> &Statistics {
        &self.stats
    }

    #[must_use]
    pub fn policy(&self) -> &dyn ReplacementPolicy {
        self.policy.as_ref()
    }

    /// Process whose page table is published to the machine.
    #[must_use]
    pub const fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// # Errors
    /// If `pid` has no address space.
    pub fn space(&self, pid: ProcessId) -> Result<&AddressSpace, VmmError> {
        self.spaces.get(&pid).ok_or(VmmError::UnknownProcess(pid))
    }

    fn space_mut(&mut self, pid: ProcessId) -> Result<&mut AddressSpace, VmmError> {
        self.spaces.get_mut(&pid).ok_or(VmmError::UnknownProcess(pid))
    }

    pub fn processes(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.spaces.keys().copied()
    }

    fn io_delay(&self) -> IoDelay {
        IoDelay::from_ticks(self.config.io_delay_ticks)
    }

    /// Create the address space of `pid` from the executable `name`.
    ///
    /// No frames are allocated; every page is loaded on first touch.
    ///
    /// # Errors
    /// If `pid` exists, the executable is missing or its header is invalid.
    pub fn create(&mut self, pid: ProcessId, name: &str) -> Result<(), VmmError> {
        if self.spaces.contains_key(&pid) {
            return Err(VmmError::ProcessExists(pid));
        }
        let mut file = self
            .files
            .open(name)
            .ok_or_else(|| VmmError::ExecutableNotFound(name.to_string()))?;
        let space = AddressSpace::new(
            pid,
            &mut file,
            name,
            self.page_size,
            self.config.user_stack_size,
        )
        .map_err(|source| match source {
            NoffError::TooLarge(bytes) => VmmError::AddressOverflow(bytes),
            source => VmmError::BadExecutable {
                name: name.to_string(),
                source,
            },
        })?;
        self.spaces.insert(pid, space);
        Ok(())
    }

    /// Resolve a fault on `va` in the address space of `pid`.
    ///
    /// Obtains a frame (possibly evicting another page), fills it from the
    /// executable or the swap store, and returns the modeled I/O delay.
    ///
    /// # Errors
    /// [`VmmError::Page`] with `OutOfRange` when `va` lies beyond the address
    /// space, [`VmmError::AlreadyResident`] when the page is mapped, and any
    /// fatal frame allocation error.
    pub fn page_fault(&mut self, pid: ProcessId, va: VirtualAddress) -> Result<IoDelay, VmmError> {
        let space = self.space(pid)?;
        let vpn = space.page_of(va)?;
        if space.entry(vpn)?.is_valid() {
            return Err(VmmError::AlreadyResident { pid, vpn });
        }
        trace!("{pid}: page fault at {va}");
        self.fault_in(pid, vpn)
    }

    /// Load `vpn` of `pid` into a fresh frame. If the page cannot be filled,
    /// the frame goes back to the pool and the entry stays invalid.
    fn fault_in(&mut self, pid: ProcessId, vpn: VirtualPageNumber) -> Result<IoDelay, VmmError> {
        let frame = self.obtain_frame(pid, vpn, None)?;
        let space = self
            .spaces
            .get_mut(&pid)
            .ok_or(VmmError::UnknownProcess(pid))?;
        if let Err(err) = space.populate(vpn, self.machine.main_memory_mut(), &self.files) {
            space.discard(vpn)?;
            self.frames.release(frame, FrameOwner::new(pid, vpn))?;
            self.machine.set_referenced(frame, false);
            warn!("{pid}: fault on {vpn} abandoned: {err}");
            return Err(err.into());
        }
        self.stats.page_faults += 1;
        Ok(self.io_delay())
    }

    /// Select a frame for `vpn` of `pid`, evict its previous page if any,
    /// and map it. `exclude` is never chosen.
    fn obtain_frame(
        &mut self,
        pid: ProcessId,
        vpn: VirtualPageNumber,
        exclude: Option<FrameNumber>,
    ) -> Result<FrameNumber, VmmError> {
        let frame = self
            .policy
            .select(&self.frames, &mut self.machine, exclude)?;

        match self.frames.slot(frame).copied() {
            Some(FrameSlot::Free) => {}
            Some(FrameSlot::Owned(victim)) => self.evict(frame, victim)?,
            Some(FrameSlot::Shared { .. }) | None => {
                return Err(VmmError::InconsistentFrame(frame));
            }
        }

        self.frames.assign(frame, FrameOwner::new(pid, vpn))?;
        self.space(pid)?.map_frame(vpn, frame)?;
        Ok(frame)
    }

    fn evict(&mut self, frame: FrameNumber, victim: FrameOwner) -> Result<(), VmmError> {
        let owner = self
            .spaces
            .get_mut(&victim.pid)
            .ok_or(VmmError::InconsistentFrame(frame))?;
        let eviction = owner.save_to_swap(victim.vpn, self.machine.main_memory())?;
        if eviction.frame != frame {
            return Err(VmmError::InconsistentFrame(frame));
        }
        self.frames.release(frame, victim)?;

        self.stats.evictions += 1;
        if eviction.written {
            self.stats.swap_writes += 1;
        }
        trace!("{}: {} evicted from {frame}", victim.pid, victim.vpn);
        Ok(())
    }

    /// Duplicate the address space of `parent` as `child`.
    ///
    /// Shared pages alias the parent's frames. Private pages the parent has
    /// touched are copied into new frames, first faulting them back into the
    /// parent if they were evicted. Untouched pages stay invalid in the
    /// child and load lazily. Returns the summed I/O delay of every reload
    /// and copy.
    ///
    /// On failure the partially built child is torn down again.
    ///
    /// # Errors
    /// If `parent` is unknown, `child` exists, or a frame cannot be obtained.
    pub fn fork(&mut self, parent: ProcessId, child: ProcessId) -> Result<IoDelay, VmmError> {
        if self.spaces.contains_key(&child) {
            return Err(VmmError::ProcessExists(child));
        }
        let layout = self.space(parent)?.fork_layout(child);
        self.spaces.insert(child, layout);

        match self.fork_pages(parent, child) {
            Ok(delay) => {
                debug!("{parent}: forked into {child}, delay {} ticks", delay.ticks());
                Ok(delay)
            }
            Err(err) => {
                if let Err(cleanup) = self.destroy(child) {
                    warn!("{child}: teardown after failed fork: {cleanup}");
                }
                Err(err)
            }
        }
    }

    fn fork_pages(&mut self, parent: ProcessId, child: ProcessId) -> Result<IoDelay, VmmError> {
        let pages = self.space(parent)?.num_pages();
        let mut delay = IoDelay::ZERO;

        for vpn in (0..pages).filter_map(VirtualPageNumber::from_index) {
            let mut entry = self.space(parent)?.entry(vpn)?;

            if entry.is_shared() {
                let frame = entry.frame().ok_or(PageError::NotResident(vpn))?;
                self.frames.share(frame)?;
                self.space(child)?.inherit_entry(vpn, &entry, Some(frame))?;
                self.stats.shared_aliases += 1;
                self.stats.page_faults += 1;
                continue;
            }

            if entry.is_used_before() && !entry.is_valid() {
                delay += self.fault_in(parent, vpn)?;
                entry = self.space(parent)?.entry(vpn)?;
            }
            let Some(source) = entry.frame() else {
                continue;
            };

            let frame = self.obtain_frame(child, vpn, Some(source))?;
            let src = source.byte_range(self.page_size);
            let dst = frame.byte_range(self.page_size);
            let memory = self.machine.main_memory_mut();
            memory.copy_within(src, dst.start);

            let copied = self
                .machine
                .main_memory()
                .get(dst)
                .ok_or(PageError::FrameOutsideMemory(frame))?;
            let space = self
                .spaces
                .get_mut(&child)
                .ok_or(VmmError::UnknownProcess(child))?;
            space.seed_swap(vpn, copied)?;
            space.inherit_entry(vpn, &entry, Some(frame))?;

            self.stats.fork_copies += 1;
            self.stats.page_faults += 1;
            delay += self.io_delay();
        }
        Ok(delay)
    }

    /// Append a zero-filled shared region of at least `bytes` bytes to the
    /// address space of `pid`.
    ///
    /// Every new page gets a fresh frame right away and is marked shared,
    /// valid and used; children forked later alias these frames. Returns the
    /// virtual address at which the region starts. If `pid` is running, its
    /// page table is republished with the new length.
    ///
    /// On failure the frames obtained so far are released and the address
    /// space shrinks back to its previous size.
    ///
    /// # Errors
    /// If `pid` is unknown, the address space would exceed 32 bits, or a
    /// frame cannot be obtained.
    pub fn extend_shared(&mut self, pid: ProcessId, bytes: usize) -> Result<VirtualAddress, VmmError> {
        let page_size = self.page_size;
        let space = self.space_mut(pid)?;
        let old_bytes = space.size_bytes();
        let pages = page_size.pages_for(bytes);
        let new_bytes = old_bytes + pages * page_size.bytes();
        if u32::try_from(new_bytes).is_err() {
            return Err(VmmError::AddressOverflow(new_bytes));
        }
        let offset = u32::try_from(old_bytes).map_err(|_| VmmError::AddressOverflow(old_bytes))?;

        let start = space.extend(pages);
        if let Err(err) = self.map_shared_pages(pid, start, pages) {
            self.shrink(pid, start.as_usize())?;
            return Err(err);
        }

        if self.current == Some(pid) {
            let space = self.spaces.get(&pid).ok_or(VmmError::UnknownProcess(pid))?;
            space.restore_state_on_switch(&mut self.machine);
        }
        debug!("{pid}: shared region of {pages} pages at {offset:#x}");
        Ok(VirtualAddress::new(offset))
    }

    fn map_shared_pages(
        &mut self,
        pid: ProcessId,
        start: VirtualPageNumber,
        pages: usize,
    ) -> Result<(), VmmError> {
        let first = start.as_usize();
        for vpn in (first..first + pages).filter_map(VirtualPageNumber::from_index) {
            let frame = self.obtain_frame(pid, vpn, None)?;
            self.machine
                .main_memory_mut()
                .get_mut(frame.byte_range(self.page_size))
                .ok_or(PageError::FrameOutsideMemory(frame))?
                .fill(0);
            self.frames.mark_shared(frame)?;
            self.space(pid)?.map_shared(vpn, frame)?;
        }
        Ok(())
    }

    /// Release every frame mapped at or above page `pages` of `pid` and cut
    /// the address space back to `pages` pages.
    fn shrink(&mut self, pid: ProcessId, pages: usize) -> Result<(), VmmError> {
        let dropped: Vec<PageTableEntry> = self
            .space(pid)?
            .page_table()
            .iter()
            .skip(pages)
            .copied()
            .collect();
        for entry in &dropped {
            self.release_entry(pid, entry)?;
        }
        self.space_mut(pid)?.truncate(pages);
        debug!("{pid}: shared extension rolled back to {pages} pages");
        Ok(())
    }

    /// Give back the frame `entry` of `pid` maps, if any. Shared frames lose
    /// one sharer. Returns whether the frame became free.
    fn release_entry(&mut self, pid: ProcessId, entry: &PageTableEntry) -> Result<bool, FrameError> {
        let Some(frame) = entry.frame() else {
            return Ok(false);
        };
        let freed = if entry.is_shared() {
            self.frames.release_shared(frame)?
        } else {
            self.frames
                .release(frame, FrameOwner::new(pid, entry.virtual_page()))?;
            true
        };
        if freed {
            self.machine.set_referenced(frame, false);
        }
        Ok(freed)
    }

    /// Tear down the address space of `pid`.
    ///
    /// Private frames go back to the pool after checking they are still
    /// tagged with this process and page. Shared frames lose one sharer and
    /// are freed with the last one. Every frame is visited even if an
    /// earlier one fails the check; the first failure is returned.
    ///
    /// # Errors
    /// If `pid` is unknown or a frame's tag does not match its entry.
    pub fn destroy(&mut self, pid: ProcessId) -> Result<(), VmmError> {
        let space = self
            .spaces
            .remove(&pid)
            .ok_or(VmmError::UnknownProcess(pid))?;
        if self.current == Some(pid) {
            space.save_state_on_switch(&mut self.machine);
            self.current = None;
        }

        let mut first_error: Option<FrameError> = None;
        for entry in space.page_table().iter() {
            if let Err(err) = self.release_entry(pid, entry) {
                warn!("{pid}: cannot release {}: {err}", entry.virtual_page());
                first_error.get_or_insert(err);
            }
        }

        debug!(
            "{pid}: destroyed, {} of {} frames in use",
            self.frames.used(),
            self.frames.len()
        );
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Make `pid` the running process: withdraw the previous page table and
    /// publish this one.
    ///
    /// # Errors
    /// If `pid` is unknown.
    pub fn switch_to(&mut self, pid: ProcessId) -> Result<(), VmmError> {
        let next = self.spaces.get(&pid).ok_or(VmmError::UnknownProcess(pid))?;
        if let Some(previous) = self.current.and_then(|p| self.spaces.get(&p)) {
            previous.save_state_on_switch(&mut self.machine);
        }
        next.restore_state_on_switch(&mut self.machine);
        self.current = Some(pid);
        Ok(())
    }

    /// Withdraw the running process' page table, leaving no process current.
    pub fn switch_out(&mut self) {
        if let Some(previous) = self.current.take().and_then(|p| self.spaces.get(&p)) {
            previous.save_state_on_switch(&mut self.machine);
        }
    }

    /// Reset the machine registers for a fresh start of `pid`.
    ///
    /// # Errors
    /// If `pid` is unknown.
    pub fn init_registers(&mut self, pid: ProcessId) -> Result<(), VmmError> {
        let space = self.spaces.get(&pid).ok_or(VmmError::UnknownProcess(pid))?;
        space.init_registers(&mut self.machine)?;
        Ok(())
    }
}

impl<F: FileSystem> Vmm<SimMachine, F> {
    /// Read user memory of the running process, resolving page faults.
    ///
    /// Returns the summed I/O delay of the faults taken.
    ///
    /// # Errors
    /// If no process is running, an address is outside its address space,
    /// or a fault cannot be resolved.
    pub fn read_user(&mut self, va: VirtualAddress, buf: &mut [u8]) -> Result<IoDelay, VmmError> {
        let pid = self.current.ok_or(VmmError::NoCurrentProcess)?;
        let mut delay = IoDelay::ZERO;
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = offset(va, i)?;
            *byte = loop {
                match self.machine.read_byte(addr) {
                    Ok(value) => break value,
                    Err(Exception::PageFault(at)) => delay += self.page_fault(pid, at)?,
                    Err(other) => return Err(other.into()),
                }
            };
        }
        Ok(delay)
    }

    /// Write user memory of the running process, resolving page faults.
    ///
    /// Returns the summed I/O delay of the faults taken.
    ///
    /// # Errors
    /// If no process is running, an address is outside its address space,
    /// or a fault cannot be resolved.
    pub fn write_user(&mut self, va: VirtualAddress, bytes: &[u8]) -> Result<IoDelay, VmmError> {
        let pid = self.current.ok_or(VmmError::NoCurrentProcess)?;
        let mut delay = IoDelay::ZERO;
        for (i, &value) in bytes.iter().enumerate() {
            let addr = offset(va, i)?;
            loop {
                match self.machine.write_byte(addr, value) {
                    Ok(()) => break,
                    Err(Exception::PageFault(at)) => delay += self.page_fault(pid, at)?,
                    Err(other) => return Err(other.into()),
                }
            }
        }
        Ok(delay)
    }
}

fn offset(va: VirtualAddress, i: usize) -> Result<VirtualAddress, VmmError> {
    u32::try_from(i)
        .ok()
        .and_then(|i| va.checked_add(i))
        .ok_or(VmmError::Access(Exception::AddressError(va)))
}
