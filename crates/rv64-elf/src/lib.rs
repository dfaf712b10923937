//! ELF64 program loading.
//!
//! The loader parses a little-endian ELF64 image, installs a virtual
//! mapping for every page of each `PT_LOAD` segment, and copies the
//! segment bytes in through the physical store. Guest physical pages are
//! handed out sequentially from a cursor that starts just past the
//! page-table region; under bare translation segments are identity-mapped
//! instead. A fixed-size stack region ending at a well-known top address
//! is mapped the same way.

use std::collections::HashMap;

use object::LittleEndian;
use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};
use thiserror::Error;
use tracing::debug;

use sim_core::{RegValue, SimStatus, VirtAddr};

use rv64_hart::Satp;
use rv64_mem::{
    MemoryMapper, MemoryMapping, PAGE_BITS, PAGE_OFFSET_MASK, PAGE_SIZE, PhysMemory, Ppn, PteFlags,
    TranslationMode, Vpn,
};

/// First VPN past the top of the stack region.
pub const STACK_TOP_VPN: Vpn = 0x1000_0000;

/// Default stack size in pages (16 MiB).
pub const DEFAULT_STACK_PAGES: u64 = 0x1000;

/// Physical page range reserved for page tables.
const TABLE_REGION_BEGIN: Ppn = 0;
const TABLE_REGION_END: Ppn = 0x10;

/// Why a program image could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse ELF image: {0}")]
    Parse(#[from] object::read::Error),
    #[error("segment file data extends past the image")]
    Truncated,
    #[error("guest mapping failed with status {0:?}")]
    Map(SimStatus),
}

impl From<SimStatus> for LoadError {
    fn from(status: SimStatus) -> Self {
        Self::Map(status)
    }
}

/// Loads a guest image and builds its initial address space.
///
/// Borrows the simulator's physical memory for the whole setup phase;
/// once the loader is dropped, the mapping set is frozen and simulation
/// may start.
pub struct Loader<'a> {
    phys_memory: &'a mut PhysMemory,
    mode: TranslationMode,
    mapper: Option<MemoryMapper>,
    next_ppn: Ppn,
    mapping: HashMap<Vpn, Ppn>,
}

impl<'a> Loader<'a> {
    /// Create a loader for the given translation mode. Under SV modes this
    /// installs the (empty) root table at the start of the table region.
    #[must_use]
    pub fn new(phys_memory: &'a mut PhysMemory, mode: TranslationMode) -> Self {
        let mapper = if mode == TranslationMode::Bare {
            None
        } else {
            Some(MemoryMapper::new(
                phys_memory,
                mode,
                TABLE_REGION_BEGIN,
                TABLE_REGION_END,
            ))
        };

        Self {
            phys_memory,
            mode,
            mapper,
            next_ppn: TABLE_REGION_END,
            mapping: HashMap::new(),
        }
    }

    /// The SATP value describing the address space this loader built.
    #[must_use]
    pub fn satp(&self) -> Satp {
        match &self.mapper {
            Some(mapper) => Satp::new(self.mode, mapper.root_ppn()),
            None => Satp::new(TranslationMode::Bare, 0),
        }
    }

    /// Map one guest page, allocating its backing frame.
    fn map_page(&mut self, vpn: Vpn) -> Result<(), SimStatus> {
        let Some(mapper) = &mut self.mapper else {
            // Bare translation: identity-map the RAM page
            let _ = self.phys_memory.add_ram_page(vpn * PAGE_SIZE);
            return Ok(());
        };

        // Adjacent segments may share a boundary page
        if self.mapping.contains_key(&vpn) {
            return Ok(());
        }

        let ppn = self.next_ppn;
        self.next_ppn += 1;
        let _ = self.phys_memory.add_ram_page(ppn * PAGE_SIZE);

        let flags = PteFlags::new(PteFlags::U | PteFlags::R | PteFlags::W | PteFlags::X);
        mapper.map(self.phys_memory, MemoryMapping { flags, vpn, ppn })?;

        let _ = self.mapping.insert(vpn, ppn);
        Ok(())
    }

    /// Physical page backing `vpn`. The page must have been mapped.
    fn resolve(&self, vpn: Vpn) -> Ppn {
        if self.mapper.is_none() { vpn } else { self.mapping[&vpn] }
    }

    /// Load every `PT_LOAD` segment of `image` and return the entry VA.
    pub fn load_elf(&mut self, image: &[u8]) -> Result<VirtAddr, LoadError> {
        let header = elf::FileHeader64::<LittleEndian>::parse(image)?;
        let endian = header.endian()?;

        for ph in header.program_headers(endian, image)? {
            if ph.p_type(endian) != elf::PT_LOAD {
                continue;
            }

            let vaddr = ph.p_vaddr(endian);
            let memsz = ph.p_memsz(endian);
            let filesz = ph.p_filesz(endian);
            if memsz == 0 {
                continue;
            }

            debug!(vaddr, memsz, filesz, "loading PT_LOAD segment");

            // Map every page the segment touches
            let mut page_va = vaddr & !PAGE_OFFSET_MASK;
            while page_va < vaddr + memsz {
                self.map_page(page_va >> PAGE_BITS)?;
                page_va += PAGE_SIZE;
            }

            // Copy the file-backed part, page by page
            let bytes = ph.data(endian, image).map_err(|()| LoadError::Truncated)?;
            let mut offset = 0u64;
            while offset < bytes.len() as u64 {
                let va = vaddr + offset;
                let page_off = va & PAGE_OFFSET_MASK;
                let page_pa = self.resolve(va >> PAGE_BITS) * PAGE_SIZE + page_off;

                let chunk = (PAGE_SIZE - page_off).min(bytes.len() as u64 - offset);
                self.phys_memory
                    .write_bytes(page_pa, &bytes[offset as usize..(offset + chunk) as usize])
                    .map_err(LoadError::Map)?;

                offset += chunk;
            }
        }

        Ok(header.e_entry(endian))
    }

    /// Map a stack of `pages` pages ending at the fixed stack top and
    /// return the initial stack pointer.
    pub fn map_stack(&mut self, pages: u64) -> Result<RegValue, LoadError> {
        for vpn in (STACK_TOP_VPN - pages)..STACK_TOP_VPN {
            self.map_page(vpn)?;
        }

        let sp = STACK_TOP_VPN * PAGE_SIZE;
        debug!(sp, pages, "mapped stack region");
        Ok(sp)
    }
}
