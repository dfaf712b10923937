//! Hart state: the register file, the CSRs translation consumes, and the
//! program counter, aggregated into a [`Hart`].

mod csr;
mod gpr;
mod hart;

pub use csr::{CSR_MSTATUS, CSR_SATP, CsrFile, Mstatus, Satp};
pub use gpr::{GPR_COUNT, GprFile, reg};
pub use hart::Hart;
