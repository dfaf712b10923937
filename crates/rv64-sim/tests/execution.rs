//! End-to-end execution tests: literal RV64I programs in, architectural
//! state out.

use sim_core::{InstrCode, PhysAddr, SimStatus, VirtAddr};

use rv64_hart::{Satp, reg};
use rv64_mem::{
    MemoryMapper, MemoryMapping, PAGE_SIZE, PhysMemory, Ppn, PteFlags, TranslationMode, Vpn,
};
use rv64_sim::Simulator;

const CODE_SEG_BASE: PhysAddr = 0x50_0000_0000;

const ECALL: InstrCode = 0x0000_0073;
const ADDIW_A7_93: InstrCode = 0x05D0_089B; // addiw a7, zero, 93

/// Place `code` at physical `base` (bare translation) and run it.
fn load_code(sim: &mut Simulator, base: PhysAddr, code: &[InstrCode]) {
    let phys_memory = sim.phys_memory_mut();

    let end = base + (code.len() as u64) * 4;
    let mut page_pa = base & !(PAGE_SIZE - 1);
    while page_pa < end {
        let _ = phys_memory.add_ram_page(page_pa);
        page_pa += PAGE_SIZE;
    }

    for (i, &word) in code.iter().enumerate() {
        let _ = phys_memory
            .write(base + (i as u64) * 4, word)
            .expect("code write");
    }
}

fn run(sim: &mut Simulator, code: &[InstrCode]) -> SimStatus {
    load_code(sim, CODE_SEG_BASE, code);
    sim.simulate(CODE_SEG_BASE)
}

#[test]
fn ecall_exit() {
    let mut sim = Simulator::new();
    let code = [ADDIW_A7_93, ECALL];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.icount(), 2);
    assert_eq!(sim.hart().gpr.read(reg::A7), 93);
}

#[test]
fn add_sub_words() {
    let mut sim = Simulator::new();
    let code = [
        0x00A0059B, // addiw a1, zero, 10
        0x0140051B, // addiw a0, zero, 20
        0x00B5053B, // addw  a0, a0, a1
        0x40A5853B, // subw  a0, a1, a0
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.icount(), 6);

    assert_eq!(sim.hart().gpr.read(reg::A0), 0xFFFF_FFFF_FFFF_FFEC); // -20
    assert_eq!(sim.hart().gpr.read(reg::A1), 10);
}

#[test]
fn for_loop_summation() {
    let mut sim = Simulator::new();
    let code = [
        0x0000051B, // addiw a0, zero, 0
        0x0000029B, // addiw t0, zero, 0
        0x0050031B, // addiw t1, zero, 5
        // for:
        0x0062D863, // bge   t0, t1, end
        0x0055053B, // addw  a0, a0, t0
        0x0012829B, // addiw t0, t0, 1
        0xFF5FF06F, // j     for
        // end:
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.icount(), 26);

    assert_eq!(sim.hart().gpr.read(reg::A0), 10);
    assert_eq!(sim.hart().gpr.read(reg::T0), 5);
    assert_eq!(sim.hart().gpr.read(reg::T1), 5);
}

#[test]
fn load_store_through_base_register() {
    const DATA_PAGE_PA: PhysAddr = 0x60_0000_0000;

    let mut sim = Simulator::new();
    assert!(sim.phys_memory_mut().add_ram_page(DATA_PAGE_PA));

    let code = [
        0x1BF0051B, // addiw a0, zero, 0x1BF
        0x0060059B, // addiw a1, zero, 6
        0x02459593, // slli  a1, a1, 36
        0x00358593, // addi  a1, a1, 3
        0x00A5B2A3, // sd    a0, 5(a1)
        0x00858593, // addi  a1, a1, 8
        0xFFD5B603, // ld    a2, -3(a1)
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.icount(), code.len() as u64);

    assert_eq!(sim.hart().gpr.read(reg::A1), DATA_PAGE_PA + 11);
    assert_eq!(sim.hart().gpr.read(reg::A2), 0x1BF);
}

#[test]
fn unaligned_load_faults_at_its_pc() {
    let mut sim = Simulator::new();
    let code = [
        0x0050059B, // addiw a1, zero, 5
        0x02459593, // slli  a1, a1, 36
        0x00158593, // addi  a1, a1, 1
        0x0005A603, // lw    a2, 0(a1)   ; a1 = 0x50_0000_0001
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::UnalignedLoad);

    // pc still points at the faulting lw; only the three preceding
    // instructions retired
    assert_eq!(sim.hart().pc, CODE_SEG_BASE + 12);
    assert_eq!(sim.icount(), 3);
    assert_eq!(sim.hart().gpr.read(reg::A2), 0);
}

/// Map one code page under SV39 and return the root PPN.
fn map_sv39_code_page(
    phys_memory: &mut PhysMemory,
    code_vpn: Vpn,
    code_ppn: Ppn,
) -> Ppn {
    const TABLE_REGION_BEGIN: Ppn = 0x10;
    const TABLE_REGION_END: Ppn = 0x20;

    let mut mapper = MemoryMapper::new(
        phys_memory,
        TranslationMode::Sv39,
        TABLE_REGION_BEGIN,
        TABLE_REGION_END,
    );

    assert!(phys_memory.add_ram_page(code_ppn * PAGE_SIZE));
    mapper
        .map(
            phys_memory,
            MemoryMapping {
                flags: PteFlags::new(PteFlags::U | PteFlags::R | PteFlags::W | PteFlags::X),
                vpn: code_vpn,
                ppn: code_ppn,
            },
        )
        .expect("map code page");

    mapper.root_ppn()
}

#[test]
fn sv39_translated_execution() {
    const CODE_VA: VirtAddr = 0x50_0000_0000;
    const CODE_PPN: Ppn = 0x200;

    let mut sim = Simulator::new();
    let root_ppn = map_sv39_code_page(sim.phys_memory_mut(), CODE_VA / PAGE_SIZE, CODE_PPN);

    // Code lives at its physical frame; execution sees it at CODE_VA
    let code = [ADDIW_A7_93, ECALL];
    for (i, &word) in code.iter().enumerate() {
        let _ = sim
            .phys_memory_mut()
            .write(CODE_PPN * PAGE_SIZE + (i as u64) * 4, word)
            .expect("code write");
    }

    sim.set_satp(Satp::new(TranslationMode::Sv39, root_ppn));

    assert_eq!(sim.simulate(CODE_VA), SimStatus::Ok);
    assert_eq!(sim.icount(), 2);
    assert_eq!(sim.hart().gpr.read(reg::A7), 93);
}

#[test]
fn sv39_unmapped_data_page_faults() {
    const CODE_VA: VirtAddr = 0x50_0000_0000;
    const CODE_PPN: Ppn = 0x200;

    let mut sim = Simulator::new();
    let root_ppn = map_sv39_code_page(sim.phys_memory_mut(), CODE_VA / PAGE_SIZE, CODE_PPN);

    // lw against VA 0x1000, which no table maps
    let code = [
        0x0010059B, // addiw a1, zero, 1
        0x00C59593, // slli  a1, a1, 12
        0x0005A603, // lw    a2, 0(a1)
        ADDIW_A7_93,
        ECALL,
    ];
    for (i, &word) in code.iter().enumerate() {
        let _ = sim
            .phys_memory_mut()
            .write(CODE_PPN * PAGE_SIZE + (i as u64) * 4, word)
            .expect("code write");
    }

    sim.set_satp(Satp::new(TranslationMode::Sv39, root_ppn));

    assert_eq!(sim.simulate(CODE_VA), SimStatus::MmuPageFault);
    assert_eq!(sim.hart().pc, CODE_VA + 8);
    assert_eq!(sim.icount(), 2);
}

#[test]
fn satp_write_flushes_cached_translations() {
    const TABLE_REGION_BEGIN: Ppn = 0x10;

    let mut sim = Simulator::new();
    let code = [ADDIW_A7_93, ECALL];

    // First run in bare mode populates the fetch TLB and block cache
    assert_eq!(run(&mut sim, &code), SimStatus::Ok);

    // An empty SV39 root makes the same PC unmapped. If either cache
    // survived the SATP write, the stale block would still execute.
    assert!(
        sim.phys_memory_mut()
            .add_ram_page(TABLE_REGION_BEGIN * PAGE_SIZE)
    );
    sim.set_satp(Satp::new(TranslationMode::Sv39, TABLE_REGION_BEGIN));

    assert_eq!(sim.simulate(CODE_SEG_BASE), SimStatus::MmuPageFault);

    // Restoring bare translation must flush again, back to a clean run
    sim.set_satp(Satp::new(TranslationMode::Bare, 0));
    assert_eq!(sim.simulate(CODE_SEG_BASE), SimStatus::Ok);
    assert_eq!(sim.hart().gpr.read(reg::A7), 93);
}

#[test]
fn jal_links_pc_plus_4() {
    let mut sim = Simulator::new();
    let code = [
        0x0080006F, // jal  zero, +8   ; skip the next instruction
        0x0000051B, // addiw a0, zero, 0 (skipped)
        0x008000EF, // jal  ra, +8     ; skip again, link into ra
        0x7FF0051B, // addiw a0, zero, 0x7FF (skipped)
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.icount(), 4);

    assert_eq!(sim.hart().gpr.read(reg::A0), 0);
    // Link value is the jal's own pc + 4
    assert_eq!(sim.hart().gpr.read(reg::RA), CODE_SEG_BASE + 12);
}

#[test]
fn jalr_clears_target_low_bit() {
    let mut sim = Simulator::new();
    let code = [
        0x0050029B, // addiw t0, zero, 5
        0x02429293, // slli  t0, t0, 36   ; t0 = 0x50_0000_0000
        0x01128293, // addi  t0, t0, 17   ; t0 = base + 17 (odd)
        0x00128167, // jalr  sp, t0, 1    ; target = (base + 18) & ~1 = base + 18
        0x0000051B, // addiw a0, zero, 0
        ADDIW_A7_93,
        ECALL,
    ];

    // (base + 17 + 1) & ~1 = base + 18: still misaligned for 4-byte
    // instructions, so the jump itself reports the alignment error
    assert_eq!(run(&mut sim, &code), SimStatus::PcAlignError);
    assert_eq!(sim.icount(), 3);
}

#[test]
fn jalr_reaches_aligned_target() {
    let mut sim = Simulator::new();
    let code = [
        0x0050029B, // addiw t0, zero, 5
        0x02429293, // slli  t0, t0, 36    ; t0 = 0x50_0000_0000
        0x01528293, // addi  t0, t0, 21    ; t0 = base + 21 (odd)
        0xFFB280E7, // jalr  ra, t0, -5    ; target = (base + 16) & ~1 = base + 16
        0x7FF0051B, // addiw a0, zero, 0x7FF  ; the jump target at base + 16
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);

    // Masking is AND with !1: an already-even target must stay put
    assert_eq!(sim.hart().gpr.read(reg::A0), 0x7FF);
    assert_eq!(sim.hart().gpr.read(reg::RA), CODE_SEG_BASE + 16);
    assert_eq!(sim.icount(), 7);
}

#[test]
fn slti_sltiu_compare_properly() {
    let mut sim = Simulator::new();
    let code = [
        0xFFF0029B, // addiw t0, zero, -1
        0x0002A313, // slti  t1, t0, 0     ; -1 < 0 (signed) → 1
        0x0002B393, // sltiu t2, t0, 0     ; u64::MAX < 0 (unsigned) → 0
        0x8002AE13, // slti  t3, t0, -2048 ; -1 < -2048 → 0
        0x001E3E93, // sltiu t4, t3, 1     ; 0 < 1 → 1 (seqz)
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);

    assert_eq!(sim.hart().gpr.read(reg::T1), 1);
    assert_eq!(sim.hart().gpr.read(reg::T2), 0);
    assert_eq!(sim.hart().gpr.read(reg::T3), 0);
    assert_eq!(sim.hart().gpr.read(reg::T4), 1);
}

#[test]
fn zero_register_stays_zero() {
    let mut sim = Simulator::new();
    let code = [
        0x06300013, // addi zero, zero, 99
        0x123450B7, // lui  ra, 0x12345
        0x06300013, // addi zero, zero, 99
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);
    assert_eq!(sim.hart().gpr.read(reg::ZERO), 0);
    assert_eq!(sim.hart().gpr.read(reg::RA), 0x12345 << 12);
}

#[test]
fn narrow_loads_extend_by_signedness() {
    const DATA_PAGE_PA: PhysAddr = 0x60_0000_0000;

    let mut sim = Simulator::new();
    assert!(sim.phys_memory_mut().add_ram_page(DATA_PAGE_PA));
    let _ = sim
        .phys_memory_mut()
        .write(DATA_PAGE_PA, 0xFFFF_FFFF_8000_80F6u64)
        .expect("data write");

    let code = [
        0x0060029B, // addiw t0, zero, 6
        0x02429293, // slli  t0, t0, 36   ; t0 = 0x60_0000_0000
        0x0002C303, // lbu   t1, 0(t0)    ; 0xF6 zero-extended
        0x00028383, // lb    t2, 0(t0)    ; 0xF6 sign-extended
        0x0002DE03, // lhu   t3, 0(t0)    ; 0x80F6 zero-extended
        0x00029E83, // lh    t4, 0(t0)    ; 0x80F6 sign-extended
        0x0002EF03, // lwu   t5, 0(t0)    ; 0x800080F6 zero-extended
        0x0002AF83, // lw    t6, 0(t0)    ; 0x800080F6 sign-extended
        ADDIW_A7_93,
        ECALL,
    ];

    assert_eq!(run(&mut sim, &code), SimStatus::Ok);

    assert_eq!(sim.hart().gpr.read(reg::T1), 0xF6);
    assert_eq!(sim.hart().gpr.read(reg::T2), 0xFFFF_FFFF_FFFF_FFF6);
    assert_eq!(sim.hart().gpr.read(reg::T3), 0x80F6);
    assert_eq!(sim.hart().gpr.read(reg::T4), 0xFFFF_FFFF_FFFF_80F6);
    assert_eq!(sim.hart().gpr.read(reg::T5), 0x8000_80F6);
    assert_eq!(sim.hart().gpr.read(reg::T6), 0xFFFF_FFFF_8000_80F6);
}
