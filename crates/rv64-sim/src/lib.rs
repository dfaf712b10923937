//! RV64I execution engine.
//!
//! Instructions are decoded into fixed-length basic blocks, cached by start
//! address, and dispatched through per-opcode handlers. Data and fetch
//! accesses run through software TLBs that cache host frame pointers, so a
//! hit skips both the page-table walk and the physical page lookup.

mod bb;
mod bb_cache;
mod engine;
mod handlers;
mod simulator;
mod tlb;

pub use bb::{BB_MAX_INSTRS, BasicBlock};
pub use bb_cache::BbCache;
pub use simulator::Simulator;
pub use tlb::Tlb;
