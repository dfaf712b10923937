//! The simulator facade and outer loop.
//!
//! The loop resolves the current PC against the block cache (refilling on
//! a miss via the fetch pipeline), runs the block to its terminator, and
//! keeps going until a handler reports anything other than `Ok`. `Exit`
//! is the orderly case and comes back to the driver as `Ok`; every other
//! status surfaces verbatim with `pc` still at the faulting instruction.

use sim_core::{SimStatus, VirtAddr};

use rv64_decode::InstrId;
use rv64_hart::{CSR_SATP, Hart, Satp};
use rv64_mem::PhysMemory;

use crate::bb::{self, BasicBlock};
use crate::bb_cache::BbCache;
use crate::engine::Engine;
use crate::handlers::dispatch;

/// The user-mode RV64I functional simulator.
pub struct Simulator {
    engine: Engine,
    bb_cache: BbCache,
}

/// Run one decoded block to its terminator.
///
/// Straight-line handlers return `Ok` and don't end the block; branches
/// and status pseudo-instructions do. The block builder guarantees a
/// terminator within the fixed block length.
fn run_block(engine: &mut Engine, bb: &BasicBlock) -> SimStatus {
    for instr in bb.instrs() {
        let status = dispatch(instr.id)(engine, instr);

        if status != SimStatus::Ok || bb::is_branch(instr.id) || instr.id == InstrId::Status {
            return status;
        }
    }

    unreachable!("basic block without terminator");
}

impl Simulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
            bb_cache: BbCache::new(),
        }
    }

    /// Run from `start_pc` until the guest exits or faults.
    ///
    /// Returns `Ok` when the guest issues an environment call; any other
    /// status is the first failure encountered, with `pc` left at the
    /// faulting instruction.
    pub fn simulate(&mut self, start_pc: VirtAddr) -> SimStatus {
        self.engine.hart.pc = start_pc;
        self.engine.icount = 0;

        loop {
            let pc = self.engine.hart.pc;

            // Fetch & decode the current block on a cache miss
            let cached_bb = self.bb_cache.entry_mut(pc);
            if cached_bb.virt_addr() != pc {
                let engine = &mut self.engine;
                let mut fetch_va = pc;
                cached_bb.update(pc, || {
                    let code = engine.fetch(fetch_va);
                    fetch_va = fetch_va.wrapping_add(4);
                    code
                });
            }

            match run_block(&mut self.engine, cached_bb) {
                SimStatus::Exit => return SimStatus::Ok,
                SimStatus::Ok => {}
                status => return status,
            }
        }
    }

    /// Retired-instruction count of the last `simulate` call.
    #[must_use]
    pub const fn icount(&self) -> u64 {
        self.engine.icount
    }

    #[must_use]
    pub fn phys_memory(&self) -> &PhysMemory {
        &self.engine.phys_memory
    }

    pub fn phys_memory_mut(&mut self) -> &mut PhysMemory {
        &mut self.engine.phys_memory
    }

    #[must_use]
    pub const fn hart(&self) -> &Hart {
        &self.engine.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.engine.hart
    }

    /// Install a new translation regime.
    ///
    /// Every cached translation product (all three TLBs and the block
    /// cache) is dropped: it was computed under the old page tables.
    pub fn set_satp(&mut self, satp: Satp) {
        self.engine.hart.csr.set_satp(satp);
        self.invalidate_cached_translations();
    }

    /// Raw CSR write, flushing cached translations when SATP changes.
    pub fn write_csr(&mut self, idx: u16, value: u64) -> Result<(), SimStatus> {
        self.engine.hart.csr.write(idx, value)?;
        if idx == CSR_SATP {
            self.invalidate_cached_translations();
        }
        Ok(())
    }

    fn invalidate_cached_translations(&mut self) {
        self.engine.invalidate_tlbs();
        self.bb_cache.invalidate();
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
