//! Virtual-to-physical address translation.
//!
//! A walk consumes nine bits of virtual page number per level, highest
//! level first. A PTE with R or X set is a leaf; a leaf above level 0 is a
//! superpage and its PPN must be aligned to the superpage size. The walker
//! never modifies PTEs: the mapper presets A and D on every leaf it
//! writes, and the walker asserts that convention.

use sim_core::{PhysAddr, PrivLevel, SimStatus, VirtAddr, bits};

use crate::phys::PhysMemory;
use crate::pte::{
    PAGE_BITS, PAGE_SIZE, PTE_PPN_HI, PTE_PPN_LO, PTE_RESERVED_MASK, PTE_SIZE, Ppn, Pte, PteFlags,
    pte_flags, pte_ppn, vpn_field,
};

/// Address-translation scheme selected by SATP.MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    #[default]
    Bare,
    Sv39,
    Sv48,
    Sv57,
}

impl TranslationMode {
    /// Number of page-table levels; zero for bare translation.
    #[must_use]
    pub const fn levels(self) -> u32 {
        match self {
            Self::Bare => 0,
            Self::Sv39 => 3,
            Self::Sv48 => 4,
            Self::Sv57 => 5,
        }
    }
}

/// What kind of access a translation is for; selects the permission check
/// and, in the execution engine, the TLB instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Fetch,
}

/// The translator. Borrows the physical memory and a snapshot of the CSR
/// fields it consumes for the duration of one translation.
pub struct Mmu64<'a> {
    phys_memory: &'a PhysMemory,
    mode: TranslationMode,
    root_ppn: Ppn,
    mxr: bool,
    sum: bool,
}

/// Leaf permission check.
///
/// MXR makes execute-only pages readable; SUM lets supervisor code touch
/// user pages (but never execute them).
fn check_leaf_flags(
    priv_level: PrivLevel,
    kind: AccessKind,
    flags: PteFlags,
    mxr: bool,
    sum: bool,
) -> bool {
    let is_user = priv_level == PrivLevel::User;
    let user_ok = flags.u() && is_user;
    let super_rw_ok = !is_user && (!flags.u() || sum);
    let super_x_ok = !is_user && !flags.u();

    match kind {
        AccessKind::Read => {
            let is_readable = flags.r() || (flags.x() && mxr);
            is_readable && (user_ok || super_rw_ok)
        }
        AccessKind::Write => flags.w() && (user_ok || super_rw_ok),
        AccessKind::Fetch => flags.x() && (user_ok || super_x_ok),
    }
}

/// Compose the physical address: the low `12 + 9 * level` bits come from
/// the virtual address, the rest from the leaf's PPN.
fn compose_phys_addr(pte: Pte, va: VirtAddr, level: u32) -> PhysAddr {
    let offset_bits = PAGE_BITS + 9 * level;
    let offset = bits::bit_field(offset_bits - 1, 0, va);
    let ppn = bits::bit_field(PTE_PPN_HI, PTE_PPN_LO + 9 * level, pte);

    (ppn << offset_bits) + offset
}

impl<'a> Mmu64<'a> {
    #[must_use]
    pub fn new(
        phys_memory: &'a PhysMemory,
        mode: TranslationMode,
        root_ppn: Ppn,
        mxr: bool,
        sum: bool,
    ) -> Self {
        Self {
            phys_memory,
            mode,
            root_ppn,
            mxr,
            sum,
        }
    }

    /// Translate a virtual address for the given privilege and access kind.
    ///
    /// Invalid, reserved-bit, unaligned-superpage and permission failures
    /// all collapse to `MmuPageFault`; physical-memory failures while
    /// reading PTEs propagate unchanged.
    pub fn translate(
        &self,
        priv_level: PrivLevel,
        kind: AccessKind,
        va: VirtAddr,
    ) -> Result<PhysAddr, SimStatus> {
        if self.mode == TranslationMode::Bare {
            return Ok(va);
        }

        let mut level = self.mode.levels() - 1;
        let mut table_ppn = self.root_ppn;

        // Page table walk
        let (pte, flags) = loop {
            let pte_pa = table_ppn * PAGE_SIZE + vpn_field(va, level) * PTE_SIZE;
            let (pte, _) = self.phys_memory.read::<Pte>(pte_pa)?;

            let flags = pte_flags(pte);
            if !flags.v() || (!flags.r() && flags.w()) || pte & PTE_RESERVED_MASK != 0 {
                return Err(SimStatus::MmuPageFault);
            }

            // Leaf PTE found
            if flags.r() || flags.x() {
                break (pte, flags);
            }

            if level == 0 {
                return Err(SimStatus::MmuPageFault);
            }

            table_ppn = pte_ppn(pte);
            level -= 1;
        };

        if !check_leaf_flags(priv_level, kind, flags, self.mxr, self.sum) {
            return Err(SimStatus::MmuPageFault);
        }

        // Superpage PPN must be aligned to the superpage size
        if level > 0 && bits::bit_field(PTE_PPN_LO + 9 * level - 1, PTE_PPN_LO, pte) != 0 {
            return Err(SimStatus::MmuPageFault);
        }

        // The mapper presets A and D on every leaf; the walker never
        // writes PTEs itself
        debug_assert!(flags.a() && flags.d());

        Ok(compose_phys_addr(pte, va, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pte::make_pte;

    const ROOT_PPN: Ppn = 0x10;
    const LEAF_PPN: Ppn = 0x200;

    const RWXUAD: u8 = PteFlags::V
        | PteFlags::R
        | PteFlags::W
        | PteFlags::X
        | PteFlags::U
        | PteFlags::A
        | PteFlags::D;

    fn table_memory() -> PhysMemory {
        let mut pm = PhysMemory::new();
        for ppn in [ROOT_PPN, ROOT_PPN + 1, ROOT_PPN + 2] {
            assert!(pm.add_ram_page(ppn * PAGE_SIZE));
        }
        pm
    }

    /// Install a three-level SV39 mapping for `va` by hand.
    fn install_sv39_leaf(pm: &mut PhysMemory, va: VirtAddr, leaf: Pte) {
        let next = PteFlags::new(PteFlags::V);

        let pte_pa = ROOT_PPN * PAGE_SIZE + vpn_field(va, 2) * PTE_SIZE;
        let _ = pm.write(pte_pa, make_pte(ROOT_PPN + 1, next)).expect("l2");

        let pte_pa = (ROOT_PPN + 1) * PAGE_SIZE + vpn_field(va, 1) * PTE_SIZE;
        let _ = pm.write(pte_pa, make_pte(ROOT_PPN + 2, next)).expect("l1");

        let pte_pa = (ROOT_PPN + 2) * PAGE_SIZE + vpn_field(va, 0) * PTE_SIZE;
        let _ = pm.write(pte_pa, leaf).expect("l0");
    }

    fn mmu(pm: &PhysMemory) -> Mmu64<'_> {
        Mmu64::new(pm, TranslationMode::Sv39, ROOT_PPN, false, false)
    }

    #[test]
    fn bare_is_identity() {
        let pm = PhysMemory::new();
        let mmu = Mmu64::new(&pm, TranslationMode::Bare, 0, false, false);

        assert_eq!(
            mmu.translate(PrivLevel::User, AccessKind::Fetch, 0xDEAD_BEEF),
            Ok(0xDEAD_BEEF)
        );
    }

    #[test]
    fn three_level_walk() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x50_0000_0000 + 0x7A8;
        install_sv39_leaf(&mut pm, va, make_pte(LEAF_PPN, PteFlags::new(RWXUAD)));

        for kind in [AccessKind::Read, AccessKind::Write, AccessKind::Fetch] {
            assert_eq!(
                mmu(&pm).translate(PrivLevel::User, kind, va),
                Ok(LEAF_PPN * PAGE_SIZE + 0x7A8)
            );
        }
    }

    #[test]
    fn unmapped_va_page_faults() {
        let pm = table_memory();

        // Zeroed root: V=0 on the first PTE
        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, 0x1000),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn missing_root_propagates_access_fault() {
        let pm = PhysMemory::new();

        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, 0x1000),
            Err(SimStatus::PhysMemAccessFault)
        );
    }

    #[test]
    fn write_without_read_is_invalid() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x1000;
        let flags = PteFlags::new(PteFlags::V | PteFlags::W | PteFlags::U | PteFlags::A | PteFlags::D);
        install_sv39_leaf(&mut pm, va, make_pte(LEAF_PPN, flags));

        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Write, va),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn reserved_bits_page_fault() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x1000;
        let leaf = make_pte(LEAF_PPN, PteFlags::new(RWXUAD)) | (1 << 8);
        install_sv39_leaf(&mut pm, va, leaf);

        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, va),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn non_leaf_at_level_zero_page_faults() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x1000;
        // Level-0 entry marked as a further pointer: no R, no X
        install_sv39_leaf(&mut pm, va, make_pte(LEAF_PPN, PteFlags::new(PteFlags::V)));

        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, va),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn superpage_translation_and_alignment() {
        let mut pm = table_memory();
        // Leaf directly in the root: a 1 GiB superpage under SV39
        let va: VirtAddr = 0x50_0000_0000 + 0xABCDE;
        let aligned_ppn: Ppn = 0x4_0000; // low 18 PPN bits clear
        let pte_pa = ROOT_PPN * PAGE_SIZE + vpn_field(va, 2) * PTE_SIZE;

        let _ = pm
            .write(pte_pa, make_pte(aligned_ppn, PteFlags::new(RWXUAD)))
            .expect("leaf");
        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, va),
            Ok(aligned_ppn * PAGE_SIZE + 0xABCDE)
        );

        // Misaligned superpage PPN is rejected
        let _ = pm
            .write(pte_pa, make_pte(aligned_ppn | 1, PteFlags::new(RWXUAD)))
            .expect("leaf");
        assert_eq!(
            mmu(&pm).translate(PrivLevel::User, AccessKind::Read, va),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn user_page_blocked_for_supervisor_without_sum() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x1000;
        install_sv39_leaf(&mut pm, va, make_pte(LEAF_PPN, PteFlags::new(RWXUAD)));

        let locked = Mmu64::new(&pm, TranslationMode::Sv39, ROOT_PPN, false, false);
        assert_eq!(
            locked.translate(PrivLevel::Supervisor, AccessKind::Read, va),
            Err(SimStatus::MmuPageFault)
        );

        let sum = Mmu64::new(&pm, TranslationMode::Sv39, ROOT_PPN, false, true);
        assert_eq!(
            sum.translate(PrivLevel::Supervisor, AccessKind::Read, va),
            Ok(LEAF_PPN * PAGE_SIZE)
        );

        // SUM never makes user pages executable for the supervisor
        assert_eq!(
            sum.translate(PrivLevel::Supervisor, AccessKind::Fetch, va),
            Err(SimStatus::MmuPageFault)
        );
    }

    #[test]
    fn mxr_makes_execute_only_readable() {
        let mut pm = table_memory();
        let va: VirtAddr = 0x1000;
        let xo = PteFlags::new(PteFlags::V | PteFlags::X | PteFlags::U | PteFlags::A | PteFlags::D);
        install_sv39_leaf(&mut pm, va, make_pte(LEAF_PPN, xo));

        let plain = Mmu64::new(&pm, TranslationMode::Sv39, ROOT_PPN, false, false);
        assert_eq!(
            plain.translate(PrivLevel::User, AccessKind::Read, va),
            Err(SimStatus::MmuPageFault)
        );

        let mxr = Mmu64::new(&pm, TranslationMode::Sv39, ROOT_PPN, true, false);
        assert_eq!(
            mxr.translate(PrivLevel::User, AccessKind::Read, va),
            Ok(LEAF_PPN * PAGE_SIZE)
        );
    }
}
