//! Guest physical memory.
//!
//! Frames are 4 KiB, allocated on first touch by [`PhysMemory::add_ram_page`]
//! and never freed or moved while the store lives. Every successful access
//! also hands back the containing frame's host pointer so callers (the
//! software TLBs) can skip the page lookup on later accesses to the same
//! page. Frame contents sit behind `UnsafeCell` so those cached pointers
//! stay usable while the store is borrowed shared; the simulator is
//! single-threaded and the store is `!Sync`.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ptr::NonNull;

use sim_core::{PhysAddr, SimStatus};

use crate::pte::{PAGE_OFFSET_MASK, PAGE_SIZE};

/// Pointer to the base of a host-side page frame.
pub type HostPtr = NonNull<u8>;

/// A value that can be moved through guest memory.
///
/// Implemented for the unsigned widths the ISA loads and stores; handlers
/// pick sign- or zero-extension per opcode via [`MemValue::sext`] /
/// [`MemValue::zext`].
pub trait MemValue: Copy {
    /// Access width in bytes.
    const SIZE: u64;

    /// Read a little-endian value.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reading `SIZE` bytes.
    unsafe fn read_le(ptr: *const u8) -> Self;

    /// Write a little-endian value.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writing `SIZE` bytes.
    unsafe fn write_le(self, ptr: *mut u8);

    /// Zero-extend to a register value.
    fn zext(self) -> u64;

    /// Sign-extend to a register value.
    fn sext(self) -> u64;

    /// Truncate a register value to this width.
    fn truncate(value: u64) -> Self;
}

macro_rules! impl_mem_value {
    ($unsigned:ty, $signed:ty) => {
        impl MemValue for $unsigned {
            const SIZE: u64 = size_of::<$unsigned>() as u64;

            unsafe fn read_le(ptr: *const u8) -> Self {
                // SAFETY: caller guarantees SIZE readable bytes
                Self::from_le(unsafe { ptr.cast::<$unsigned>().read_unaligned() })
            }

            unsafe fn write_le(self, ptr: *mut u8) {
                // SAFETY: caller guarantees SIZE writable bytes
                unsafe { ptr.cast::<$unsigned>().write_unaligned(self.to_le()) }
            }

            fn zext(self) -> u64 {
                u64::from(self)
            }

            fn sext(self) -> u64 {
                self as $signed as i64 as u64
            }

            fn truncate(value: u64) -> Self {
                value as $unsigned
            }
        }
    };
}

impl_mem_value!(u8, i8);
impl_mem_value!(u16, i16);
impl_mem_value!(u32, i32);

impl MemValue for u64 {
    const SIZE: u64 = 8;

    unsafe fn read_le(ptr: *const u8) -> Self {
        // SAFETY: caller guarantees SIZE readable bytes
        Self::from_le(unsafe { ptr.cast::<Self>().read_unaligned() })
    }

    unsafe fn write_le(self, ptr: *mut u8) {
        // SAFETY: caller guarantees SIZE writable bytes
        unsafe { ptr.cast::<Self>().write_unaligned(self.to_le()) }
    }

    fn zext(self) -> u64 {
        self
    }

    fn sext(self) -> u64 {
        self
    }

    fn truncate(value: u64) -> Self {
        value
    }
}

/// One host-side page frame.
struct Frame(UnsafeCell<[u8; PAGE_SIZE as usize]>);

impl Frame {
    fn zeroed() -> Box<Self> {
        Box::new(Self(UnsafeCell::new([0; PAGE_SIZE as usize])))
    }

    fn base_ptr(&self) -> HostPtr {
        // SAFETY: UnsafeCell::get never returns null
        unsafe { NonNull::new_unchecked(self.0.get().cast::<u8>()) }
    }
}

/// Guest physical memory: RAM pages mapped to host frames on demand.
///
/// The mapping set is populated during load/setup and frozen once
/// simulation starts; only frame contents mutate afterwards. That is the
/// invariant that keeps the host pointers handed out here stable for the
/// lifetime of the store.
#[derive(Default)]
pub struct PhysMemory {
    frames: HashMap<PhysAddr, Box<Frame>>,
}

impl PhysMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a RAM page at the given page-aligned physical address.
    ///
    /// Returns whether a new frame was installed; an already-mapped page is
    /// left untouched.
    pub fn add_ram_page(&mut self, page_pa: PhysAddr) -> bool {
        assert!(page_pa & PAGE_OFFSET_MASK == 0);

        match self.frames.entry(page_pa) {
            Entry::Vacant(slot) => {
                let _ = slot.insert(Frame::zeroed());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    fn frame_ptr(&self, page_pa: PhysAddr) -> Option<HostPtr> {
        self.frames.get(&page_pa).map(|frame| frame.base_ptr())
    }

    /// Read a value at `pa`, returning it with the frame's host pointer.
    pub fn read<T: MemValue>(&self, pa: PhysAddr) -> Result<(T, HostPtr), SimStatus> {
        let offset = pa & PAGE_OFFSET_MASK;
        if offset + T::SIZE > PAGE_SIZE {
            return Err(SimStatus::PhysMemPageAlignError);
        }

        let base = self
            .frame_ptr(pa & !PAGE_OFFSET_MASK)
            .ok_or(SimStatus::PhysMemAccessFault)?;

        // SAFETY: offset + SIZE <= PAGE_SIZE, and the frame outlives &self
        let value = unsafe { T::read_le(base.as_ptr().add(offset as usize)) };
        Ok((value, base))
    }

    /// Write a value at `pa`, returning the frame's host pointer.
    pub fn write<T: MemValue>(&mut self, pa: PhysAddr, value: T) -> Result<HostPtr, SimStatus> {
        let offset = pa & PAGE_OFFSET_MASK;
        if offset + T::SIZE > PAGE_SIZE {
            return Err(SimStatus::PhysMemPageAlignError);
        }

        let base = self
            .frame_ptr(pa & !PAGE_OFFSET_MASK)
            .ok_or(SimStatus::PhysMemAccessFault)?;

        // SAFETY: offset + SIZE <= PAGE_SIZE, and the frame outlives &self
        unsafe { value.write_le(base.as_ptr().add(offset as usize)) }
        Ok(base)
    }

    /// Copy a byte slice into guest memory, spanning pages as needed.
    ///
    /// Every touched page must already be mapped.
    pub fn write_bytes(&mut self, pa: PhysAddr, bytes: &[u8]) -> Result<(), SimStatus> {
        let mut pa = pa;
        let mut remaining = bytes;

        while !remaining.is_empty() {
            let offset = pa & PAGE_OFFSET_MASK;
            let chunk = ((PAGE_SIZE - offset) as usize).min(remaining.len());

            let base = self
                .frame_ptr(pa & !PAGE_OFFSET_MASK)
                .ok_or(SimStatus::PhysMemAccessFault)?;

            // SAFETY: chunk <= PAGE_SIZE - offset, and the frame outlives &self
            unsafe {
                base.as_ptr()
                    .add(offset as usize)
                    .copy_from_nonoverlapping(remaining.as_ptr(), chunk);
            }

            pa += chunk as u64;
            remaining = &remaining[chunk..];
        }

        Ok(())
    }
}
