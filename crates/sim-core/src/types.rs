//! Guest word types and privilege levels.

/// A general-purpose register value.
pub type RegValue = u64;

/// A guest physical address.
pub type PhysAddr = u64;

/// A guest virtual address.
pub type VirtAddr = u64;

/// A raw 32-bit instruction word.
pub type InstrCode = u32;

/// Size of an instruction word in bytes.
pub const INSTR_CODE_SIZE: u64 = 4;

/// Hart privilege level.
///
/// Only the encodings translation cares about; the simulator itself runs
/// the guest in user mode and never switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivLevel {
    #[default]
    User,
    Supervisor,
    Machine,
}
