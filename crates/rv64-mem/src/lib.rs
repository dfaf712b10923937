//! Guest memory subsystem.
//!
//! [`PhysMemory`] models guest physical memory as demand-allocated 4 KiB
//! frames. [`Mmu64`] walks SV39/SV48/SV57 page tables to translate guest
//! virtual addresses, and [`MemoryMapper`] builds the initial tables the
//! loader installs program mappings through.

mod mapper;
mod mmu;
mod phys;
mod pte;

pub use mapper::{MemoryMapper, MemoryMapping};
pub use mmu::{AccessKind, Mmu64, TranslationMode};
pub use phys::{HostPtr, MemValue, PhysMemory};
pub use pte::{
    PAGE_BITS, PAGE_OFFSET_MASK, PAGE_SIZE, PTE_PPN_HI, PTE_PPN_LO, PTE_RESERVED_MASK, PTE_SIZE,
    Ppn, Pte, PteFlags, Vpn, make_pte, pte_flags, pte_ppn,
};
