//! Core types and bit utilities for the RV64 functional simulator.
//!
//! Everything the subsystem crates agree on lives here: the program-wide
//! status taxonomy, the guest word types, privilege levels, and the
//! bit-manipulation helpers that decode and translation are built on.

pub mod bits;

mod status;
mod types;

pub use status::SimStatus;
pub use types::{INSTR_CODE_SIZE, InstrCode, PhysAddr, PrivLevel, RegValue, VirtAddr};
