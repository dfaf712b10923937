//! RV64I instruction decoder.
//!
//! Turns raw 32-bit instruction words into flat decoded records the
//! dispatcher indexes on. Decoding is total: any word decodes without
//! panicking, unrecognized encodings come back as [`InstrId::Undef`].

mod decode;
mod instr;

pub use decode::decode;
pub use instr::{Instr, InstrId};
