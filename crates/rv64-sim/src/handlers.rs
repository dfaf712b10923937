//! Per-opcode semantic handlers and the dispatch table.
//!
//! Every handler either retires its instruction (bumping `icount` and
//! advancing `pc` by 4) and returns `Ok`, or returns a terminal status for
//! the outer loop: a fault at the faulting PC, `Exit` for ECALL, or the
//! status a pseudo-instruction carries. Branches and jumps retire too, but
//! set `pc` themselves and always end their block.
//!
//! All arithmetic is two's-complement: wrapping adds/subs, explicit sign
//! manipulation through casts. W-variant opcodes compute in 32 bits and
//! sign-extend the result to 64 before writing it back.

use sim_core::SimStatus;

use rv64_decode::{Instr, InstrId};
use rv64_mem::MemValue;

use crate::engine::Engine;

pub(crate) type Handler = fn(&mut Engine, &Instr) -> SimStatus;

/// Sign-extend a decoded 32-bit immediate to register width.
const fn imm64(instr: &Instr) -> u64 {
    instr.imm as i32 as i64 as u64
}

impl Engine {
    // ================================================================
    // Upper-immediate
    // ================================================================

    fn exec_lui(&mut self, instr: &Instr) -> SimStatus {
        self.hart.gpr.write(instr.rd as usize, imm64(instr));

        self.retire();
        SimStatus::Ok
    }

    fn exec_auipc(&mut self, instr: &Instr) -> SimStatus {
        let res = self.hart.pc.wrapping_add(imm64(instr));
        self.hart.gpr.write(instr.rd as usize, res);

        self.retire();
        SimStatus::Ok
    }

    // ================================================================
    // Register-immediate ALU
    // ================================================================

    fn exec_addi(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart
            .gpr
            .write(instr.rd as usize, rs1.wrapping_add(imm64(instr)));

        self.retire();
        SimStatus::Ok
    }

    fn exec_slti(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        let res = u64::from(rs1 < imm64(instr) as i64);
        self.hart.gpr.write(instr.rd as usize, res);

        self.retire();
        SimStatus::Ok
    }

    fn exec_sltiu(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let res = u64::from(rs1 < imm64(instr));
        self.hart.gpr.write(instr.rd as usize, res);

        self.retire();
        SimStatus::Ok
    }

    fn exec_xori(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 ^ imm64(instr));

        self.retire();
        SimStatus::Ok
    }

    fn exec_ori(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 | imm64(instr));

        self.retire();
        SimStatus::Ok
    }

    fn exec_andi(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 & imm64(instr));

        self.retire();
        SimStatus::Ok
    }

    fn exec_addiw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let word = rs1.wrapping_add(instr.imm);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    // Shift immediates carry the bare shamt: 6 bits for the 64-bit forms,
    // 5 bits for the W forms.

    fn exec_slli(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart
            .gpr
            .write(instr.rd as usize, rs1 << (instr.imm & 0x3F));

        self.retire();
        SimStatus::Ok
    }

    fn exec_srli(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        self.hart
            .gpr
            .write(instr.rd as usize, rs1 >> (instr.imm & 0x3F));

        self.retire();
        SimStatus::Ok
    }

    fn exec_srai(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        self.hart
            .gpr
            .write(instr.rd as usize, (rs1 >> (instr.imm & 0x3F)) as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_slliw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let word = rs1 << (instr.imm & 0x1F);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_srliw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let word = rs1 >> (instr.imm & 0x1F);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_sraiw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32 as i32;
        let word = rs1 >> (instr.imm & 0x1F);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    // ================================================================
    // Register-register ALU
    // ================================================================

    fn exec_add(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1.wrapping_add(rs2));

        self.retire();
        SimStatus::Ok
    }

    fn exec_sub(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1.wrapping_sub(rs2));

        self.retire();
        SimStatus::Ok
    }

    fn exec_sll(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x3F;
        self.hart.gpr.write(instr.rd as usize, rs1 << shamt);

        self.retire();
        SimStatus::Ok
    }

    fn exec_slt(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        let rs2 = self.hart.gpr.read(instr.rs2 as usize) as i64;
        self.hart.gpr.write(instr.rd as usize, u64::from(rs1 < rs2));

        self.retire();
        SimStatus::Ok
    }

    fn exec_sltu(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, u64::from(rs1 < rs2));

        self.retire();
        SimStatus::Ok
    }

    fn exec_xor(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 ^ rs2);

        self.retire();
        SimStatus::Ok
    }

    fn exec_srl(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x3F;
        self.hart.gpr.write(instr.rd as usize, rs1 >> shamt);

        self.retire();
        SimStatus::Ok
    }

    fn exec_sra(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x3F;
        self.hart
            .gpr
            .write(instr.rd as usize, (rs1 >> shamt) as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_or(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 | rs2);

        self.retire();
        SimStatus::Ok
    }

    fn exec_and(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.hart.gpr.write(instr.rd as usize, rs1 & rs2);

        self.retire();
        SimStatus::Ok
    }

    fn exec_addw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let rs2 = self.hart.gpr.read(instr.rs2 as usize) as u32;
        let word = rs1.wrapping_add(rs2);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_subw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let rs2 = self.hart.gpr.read(instr.rs2 as usize) as u32;
        let word = rs1.wrapping_sub(rs2);
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_sllw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x1F;
        let word = rs1 << shamt;
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_srlw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32;
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x1F;
        let word = rs1 >> shamt;
        self.hart
            .gpr
            .write(instr.rd as usize, word as i32 as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    fn exec_sraw(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as u32 as i32;
        let shamt = self.hart.gpr.read(instr.rs2 as usize) & 0x1F;
        let word = rs1 >> shamt;
        self.hart.gpr.write(instr.rd as usize, word as i64 as u64);

        self.retire();
        SimStatus::Ok
    }

    // ================================================================
    // Loads and stores
    // ================================================================

    fn load_extend<T: MemValue>(&mut self, instr: &Instr, signed: bool) -> SimStatus {
        let base = self.hart.gpr.read(instr.rs1 as usize);
        let va = base.wrapping_add(imm64(instr));

        match self.load::<T>(va) {
            Ok(value) => {
                let res = if signed { value.sext() } else { value.zext() };
                self.hart.gpr.write(instr.rd as usize, res);

                self.retire();
                SimStatus::Ok
            }
            Err(status) => status,
        }
    }

    fn store_truncate<T: MemValue>(&mut self, instr: &Instr) -> SimStatus {
        let base = self.hart.gpr.read(instr.rs1 as usize);
        let va = base.wrapping_add(imm64(instr));
        let value = T::truncate(self.hart.gpr.read(instr.rs2 as usize));

        match self.store(va, value) {
            Ok(()) => {
                self.retire();
                SimStatus::Ok
            }
            Err(status) => status,
        }
    }

    fn exec_lb(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u8>(instr, true)
    }

    fn exec_lh(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u16>(instr, true)
    }

    fn exec_lw(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u32>(instr, true)
    }

    fn exec_ld(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u64>(instr, true)
    }

    fn exec_lbu(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u8>(instr, false)
    }

    fn exec_lhu(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u16>(instr, false)
    }

    fn exec_lwu(&mut self, instr: &Instr) -> SimStatus {
        self.load_extend::<u32>(instr, false)
    }

    fn exec_sb(&mut self, instr: &Instr) -> SimStatus {
        self.store_truncate::<u8>(instr)
    }

    fn exec_sh(&mut self, instr: &Instr) -> SimStatus {
        self.store_truncate::<u16>(instr)
    }

    fn exec_sw(&mut self, instr: &Instr) -> SimStatus {
        self.store_truncate::<u32>(instr)
    }

    fn exec_sd(&mut self, instr: &Instr) -> SimStatus {
        self.store_truncate::<u64>(instr)
    }

    // ================================================================
    // Jumps and conditional branches: always block-terminal
    // ================================================================

    fn exec_jal(&mut self, instr: &Instr) -> SimStatus {
        let target = self.hart.pc.wrapping_add(imm64(instr));
        if target & 0x3 != 0 {
            return SimStatus::PcAlignError;
        }

        let link = self.hart.pc.wrapping_add(4);
        self.hart.gpr.write(instr.rd as usize, link);
        self.hart.pc = target;
        self.icount += 1;

        SimStatus::Ok
    }

    fn exec_jalr(&mut self, instr: &Instr) -> SimStatus {
        let base = self.hart.gpr.read(instr.rs1 as usize);
        let target = base.wrapping_add(imm64(instr)) & !1;
        if target & 0x3 != 0 {
            return SimStatus::PcAlignError;
        }

        let link = self.hart.pc.wrapping_add(4);
        self.hart.gpr.write(instr.rd as usize, link);
        self.hart.pc = target;
        self.icount += 1;

        SimStatus::Ok
    }

    fn branch_on(&mut self, instr: &Instr, taken: bool) -> SimStatus {
        if taken {
            let target = self.hart.pc.wrapping_add(imm64(instr));
            if target & 0x3 != 0 {
                return SimStatus::PcAlignError;
            }
            self.hart.pc = target;
        } else {
            self.hart.pc = self.hart.pc.wrapping_add(4);
        }

        self.icount += 1;
        SimStatus::Ok
    }

    fn exec_beq(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.branch_on(instr, rs1 == rs2)
    }

    fn exec_bne(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.branch_on(instr, rs1 != rs2)
    }

    fn exec_blt(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        let rs2 = self.hart.gpr.read(instr.rs2 as usize) as i64;
        self.branch_on(instr, rs1 < rs2)
    }

    fn exec_bge(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize) as i64;
        let rs2 = self.hart.gpr.read(instr.rs2 as usize) as i64;
        self.branch_on(instr, rs1 >= rs2)
    }

    fn exec_bltu(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.branch_on(instr, rs1 < rs2)
    }

    fn exec_bgeu(&mut self, instr: &Instr) -> SimStatus {
        let rs1 = self.hart.gpr.read(instr.rs1 as usize);
        let rs2 = self.hart.gpr.read(instr.rs2 as usize);
        self.branch_on(instr, rs1 >= rs2)
    }

    // ================================================================
    // System
    // ================================================================

    fn exec_ecall(&mut self, _instr: &Instr) -> SimStatus {
        // The environment call retires, then hands control to the driver
        self.retire();
        SimStatus::Exit
    }

    fn exec_status(&mut self, instr: &Instr) -> SimStatus {
        instr.status()
    }

    fn exec_undef(&mut self, _instr: &Instr) -> SimStatus {
        // The block builder rewrites Undef before it can be dispatched
        SimStatus::NotImplementedInstr
    }
}

/// Map an opcode id to its handler.
pub(crate) fn dispatch(id: InstrId) -> Handler {
    match id {
        InstrId::Lui => Engine::exec_lui,
        InstrId::Auipc => Engine::exec_auipc,

        InstrId::Jal => Engine::exec_jal,
        InstrId::Jalr => Engine::exec_jalr,

        InstrId::Beq => Engine::exec_beq,
        InstrId::Bne => Engine::exec_bne,
        InstrId::Blt => Engine::exec_blt,
        InstrId::Bge => Engine::exec_bge,
        InstrId::Bltu => Engine::exec_bltu,
        InstrId::Bgeu => Engine::exec_bgeu,

        InstrId::Lb => Engine::exec_lb,
        InstrId::Lh => Engine::exec_lh,
        InstrId::Lw => Engine::exec_lw,
        InstrId::Ld => Engine::exec_ld,
        InstrId::Lbu => Engine::exec_lbu,
        InstrId::Lhu => Engine::exec_lhu,
        InstrId::Lwu => Engine::exec_lwu,

        InstrId::Sb => Engine::exec_sb,
        InstrId::Sh => Engine::exec_sh,
        InstrId::Sw => Engine::exec_sw,
        InstrId::Sd => Engine::exec_sd,

        InstrId::Addi => Engine::exec_addi,
        InstrId::Slti => Engine::exec_slti,
        InstrId::Sltiu => Engine::exec_sltiu,
        InstrId::Xori => Engine::exec_xori,
        InstrId::Ori => Engine::exec_ori,
        InstrId::Andi => Engine::exec_andi,
        InstrId::Slli => Engine::exec_slli,
        InstrId::Srli => Engine::exec_srli,
        InstrId::Srai => Engine::exec_srai,

        InstrId::Addiw => Engine::exec_addiw,
        InstrId::Slliw => Engine::exec_slliw,
        InstrId::Srliw => Engine::exec_srliw,
        InstrId::Sraiw => Engine::exec_sraiw,

        InstrId::Add => Engine::exec_add,
        InstrId::Sub => Engine::exec_sub,
        InstrId::Sll => Engine::exec_sll,
        InstrId::Slt => Engine::exec_slt,
        InstrId::Sltu => Engine::exec_sltu,
        InstrId::Xor => Engine::exec_xor,
        InstrId::Srl => Engine::exec_srl,
        InstrId::Sra => Engine::exec_sra,
        InstrId::Or => Engine::exec_or,
        InstrId::And => Engine::exec_and,

        InstrId::Addw => Engine::exec_addw,
        InstrId::Subw => Engine::exec_subw,
        InstrId::Sllw => Engine::exec_sllw,
        InstrId::Srlw => Engine::exec_srlw,
        InstrId::Sraw => Engine::exec_sraw,

        InstrId::Ecall => Engine::exec_ecall,

        InstrId::Status => Engine::exec_status,
        InstrId::Undef => Engine::exec_undef,
    }
}
