//! Initial page-table construction.
//!
//! The mapper owns a half-open physical page range `[begin, end)` it
//! allocates table frames from; the first page of the region is always the
//! root table. It installs one 4 KiB leaf per call, allocating intermediate
//! tables on the way down. Physical memory is passed per call, the way bus
//! references are threaded through the tick path, so the mapper itself
//! holds no borrow between calls.

use sim_core::SimStatus;

use crate::mmu::TranslationMode;
use crate::phys::PhysMemory;
use crate::pte::{
    PAGE_SIZE, PTE_SIZE, Ppn, Pte, PteFlags, Vpn, make_pte, pte_flags, pte_ppn, vpn_field,
};

/// A requested virtual-to-physical page mapping.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapping {
    pub flags: PteFlags,
    pub vpn: Vpn,
    pub ppn: Ppn,
}

/// Builds initial page tables from a fixed table region.
pub struct MemoryMapper {
    mode: TranslationMode,
    table_region_begin: Ppn,
    curr_table: Ppn,
    table_region_end: Ppn,
}

impl MemoryMapper {
    /// Create a mapper over `[table_region_begin, table_region_end)` and
    /// install the (zeroed) root table at the region's first page.
    #[must_use]
    pub fn new(
        phys_memory: &mut PhysMemory,
        mode: TranslationMode,
        table_region_begin: Ppn,
        table_region_end: Ppn,
    ) -> Self {
        assert!(table_region_begin < table_region_end);
        assert!(mode != TranslationMode::Bare);

        let _ = phys_memory.add_ram_page(table_region_begin * PAGE_SIZE);

        Self {
            mode,
            table_region_begin,
            curr_table: table_region_begin + 1,
            table_region_end,
        }
    }

    /// The root table's physical page number (SATP.PPN seed).
    #[must_use]
    pub const fn root_ppn(&self) -> Ppn {
        self.table_region_begin
    }

    /// Install a leaf mapping, writing intermediate PTEs as needed.
    ///
    /// The leaf is written with V, A and D forced on. First failure wins:
    /// a mapping targeting the table region, an exhausted region, or an
    /// already-valid leaf slot each report their own status.
    pub fn map(
        &mut self,
        phys_memory: &mut PhysMemory,
        mapping: MemoryMapping,
    ) -> Result<(), SimStatus> {
        // The table region's own pages must never be mapped
        if mapping.ppn >= self.table_region_begin && mapping.ppn < self.table_region_end {
            return Err(SimStatus::MapperTableRegionPageMapped);
        }

        let va = mapping.vpn * PAGE_SIZE;
        let mut level = self.mode.levels() - 1;
        let mut table_ppn = self.table_region_begin;

        loop {
            let pte_pa = table_ppn * PAGE_SIZE + vpn_field(va, level) * PTE_SIZE;
            let (pte, _) = phys_memory.read::<Pte>(pte_pa)?;

            if !pte_flags(pte).v() {
                if level == 0 {
                    // Free leaf slot: install the mapping
                    let flags = mapping.flags.with(PteFlags::V | PteFlags::A | PteFlags::D);
                    let _ = phys_memory.write(pte_pa, make_pte(mapping.ppn, flags))?;
                    return Ok(());
                }

                // Allocate the next table frame from the region
                if self.curr_table == self.table_region_end {
                    return Err(SimStatus::MapperTableRegionEnd);
                }
                let new_table = self.curr_table;
                self.curr_table += 1;
                let _ = phys_memory.add_ram_page(new_table * PAGE_SIZE);

                let next = make_pte(new_table, PteFlags::new(PteFlags::V));
                let _ = phys_memory.write(pte_pa, next)?;

                table_ppn = new_table;
                level -= 1;
                continue;
            }

            if level == 0 {
                return Err(SimStatus::MapperAlreadyMapped);
            }

            table_ppn = pte_ppn(pte);
            level -= 1;
        }
    }
}
