//! Basic blocks of decoded instructions.
//!
//! A block is a straight-line run ending at the first branch or jump, the
//! first fetch/decode failure, or the fixed length limit. Failures are
//! recorded in place as status pseudo-instructions, so the dispatcher
//! reports them at the exact PC they belong to.

use sim_core::{InstrCode, SimStatus, VirtAddr};

use rv64_decode::{Instr, InstrId, decode};

/// Maximum number of instructions per block.
pub const BB_MAX_INSTRS: usize = 16;

/// Start address no guest virtual address can take (bit 56 set).
pub(crate) const INVALID_VA: VirtAddr = 1 << 56;

/// A decoded basic block.
#[derive(Debug, Clone, Copy)]
pub struct BasicBlock {
    virt_addr: VirtAddr,
    instrs: [Instr; BB_MAX_INSTRS],
}

/// Branches and jumps end a block: everything after them belongs to some
/// other block.
pub(crate) const fn is_branch(id: InstrId) -> bool {
    matches!(
        id,
        InstrId::Jal
            | InstrId::Jalr
            | InstrId::Beq
            | InstrId::Bne
            | InstrId::Blt
            | InstrId::Bltu
            | InstrId::Bge
            | InstrId::Bgeu
    )
}

impl BasicBlock {
    /// A fresh, invalidated block.
    #[must_use]
    pub fn new() -> Self {
        let mut bb = Self {
            virt_addr: INVALID_VA,
            instrs: [Instr::default(); BB_MAX_INSTRS],
        };
        bb.invalidate();
        bb
    }

    /// The block's start address; [`INVALID_VA`] when uninitialized.
    #[must_use]
    pub const fn virt_addr(&self) -> VirtAddr {
        self.virt_addr
    }

    #[must_use]
    pub const fn instrs(&self) -> &[Instr; BB_MAX_INSTRS] {
        &self.instrs
    }

    /// Refill the block starting at `virt_addr`, pulling words from `fetch`
    /// until a terminator.
    ///
    /// The last slot is reserved: a block that would overflow it gets an
    /// `Ok` status instruction there instead, bouncing the dispatcher back
    /// to the loop so the next PC is resolved against the cache.
    pub fn update(
        &mut self,
        virt_addr: VirtAddr,
        mut fetch: impl FnMut() -> Result<InstrCode, SimStatus>,
    ) {
        self.virt_addr = virt_addr;

        for i in 0..BB_MAX_INSTRS - 1 {
            let code = match fetch() {
                Ok(code) => code,
                // Fetch failure ends the block
                Err(status) => {
                    self.instrs[i] = Instr::status_instr(status);
                    return;
                }
            };

            let instr = decode(code);

            // Illegal instruction ends the block
            if instr.id == InstrId::Undef {
                self.instrs[i] = Instr::status_instr(SimStatus::NotImplementedInstr);
                return;
            }

            self.instrs[i] = instr;

            // Branch ends the block
            if is_branch(instr.id) {
                return;
            }
        }

        // Reached max size
        self.instrs[BB_MAX_INSTRS - 1] = Instr::status_instr(SimStatus::Ok);
    }

    /// Poison the block so a stale hit can never silently execute.
    pub fn invalidate(&mut self) {
        self.virt_addr = INVALID_VA;
        self.instrs[0] = Instr::status_instr(SimStatus::NotImplementedInstr);
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        Self::new()
    }
}
