//! The execution engine: hart state, guest memory and the access pipelines.
//!
//! Loads, stores and instruction fetches share one shape: check natural
//! alignment, probe the kind-specific TLB, and only on a miss walk the
//! page tables and touch the physical store, refilling the TLB on the way
//! out. A TLB hit is a tag compare plus one host-pointer dereference.

use sim_core::{InstrCode, SimStatus, VirtAddr};

use rv64_hart::Hart;
use rv64_mem::{AccessKind, MemValue, Mmu64, PhysMemory};

use crate::tlb::Tlb;

/// Everything a handler touches: the hart, physical memory, the three
/// TLBs and the retired-instruction counter. The block cache lives next
/// to this in [`crate::Simulator`], outside the handlers' reach.
pub(crate) struct Engine {
    pub hart: Hart,
    pub phys_memory: PhysMemory,
    pub read_tlb: Tlb,
    pub write_tlb: Tlb,
    pub fetch_tlb: Tlb,
    pub icount: u64,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            hart: Hart::new(),
            phys_memory: PhysMemory::new(),
            read_tlb: Tlb::new(),
            write_tlb: Tlb::new(),
            fetch_tlb: Tlb::new(),
            icount: 0,
        }
    }

    fn mmu(&self) -> Mmu64<'_> {
        let satp = self.hart.csr.satp();
        let mstatus = self.hart.csr.mstatus();
        Mmu64::new(
            &self.phys_memory,
            satp.mode,
            satp.ppn,
            mstatus.mxr,
            mstatus.sum,
        )
    }

    /// Fetch one instruction word at `va`.
    pub(crate) fn fetch(&mut self, va: VirtAddr) -> Result<InstrCode, SimStatus> {
        if va & 0x3 != 0 {
            return Err(SimStatus::PcAlignError);
        }

        if let Some(host) = self.fetch_tlb.find(va) {
            // SAFETY: the tag matched, so `host` points into a live frame
            // of `self.phys_memory`; the alignment check above keeps the
            // 4-byte read inside the page
            return Ok(unsafe { InstrCode::read_le(host.as_ptr()) });
        }

        let pa = self
            .mmu()
            .translate(self.hart.priv_level, AccessKind::Fetch, va)?;
        let (code, frame) = self.phys_memory.read::<InstrCode>(pa)?;
        self.fetch_tlb.update(va, frame);

        Ok(code)
    }

    /// Load a value at `va` through the read TLB.
    pub(crate) fn load<T: MemValue>(&mut self, va: VirtAddr) -> Result<T, SimStatus> {
        if va & (T::SIZE - 1) != 0 {
            return Err(SimStatus::UnalignedLoad);
        }

        if let Some(host) = self.read_tlb.find(va) {
            // SAFETY: the tag matched, so `host` points into a live frame
            // of `self.phys_memory`; natural alignment keeps the access
            // inside the page
            return Ok(unsafe { T::read_le(host.as_ptr()) });
        }

        let pa = self
            .mmu()
            .translate(self.hart.priv_level, AccessKind::Read, va)?;
        let (value, frame) = self.phys_memory.read::<T>(pa)?;
        self.read_tlb.update(va, frame);

        Ok(value)
    }

    /// Store a value at `va` through the write TLB.
    pub(crate) fn store<T: MemValue>(&mut self, va: VirtAddr, value: T) -> Result<(), SimStatus> {
        if va & (T::SIZE - 1) != 0 {
            return Err(SimStatus::UnalignedStore);
        }

        if let Some(host) = self.write_tlb.find(va) {
            // SAFETY: the tag matched, so `host` points into a live frame
            // of `self.phys_memory`; natural alignment keeps the access
            // inside the page
            unsafe { value.write_le(host.as_ptr()) }
            return Ok(());
        }

        let pa = self
            .mmu()
            .translate(self.hart.priv_level, AccessKind::Write, va)?;
        let frame = self.phys_memory.write::<T>(pa, value)?;
        self.write_tlb.update(va, frame);

        Ok(())
    }

    /// Common tail of every straight-line handler.
    pub(crate) fn retire(&mut self) {
        self.icount += 1;
        self.hart.pc = self.hart.pc.wrapping_add(4);
    }

    pub(crate) fn invalidate_tlbs(&mut self) {
        self.read_tlb.invalidate();
        self.write_tlb.invalidate();
        self.fetch_tlb.invalidate();
    }
}
