//! The hart: one hardware thread's architectural state.

use sim_core::{PrivLevel, VirtAddr};

use crate::csr::CsrFile;
use crate::gpr::GprFile;

/// Program counter, register file, CSR store and privilege level.
///
/// The hart does not own guest memory; the execution engine borrows the
/// hart and the physical memory side by side for the duration of a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hart {
    pub pc: VirtAddr,
    pub gpr: GprFile,
    pub csr: CsrFile,
    pub priv_level: PrivLevel,
}

impl Hart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
