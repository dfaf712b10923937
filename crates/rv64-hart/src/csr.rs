//! Control and status registers.
//!
//! Only the fields translation consumes are modelled: SATP's MODE and PPN,
//! and MSTATUS's MXR and SUM bits. The raw read/write surface speaks CSR
//! indices so a driver can program them the way guest software would;
//! everything else reports `CsrNotSupported`.

use sim_core::{SimStatus, bits};

use rv64_mem::{Ppn, TranslationMode};

/// CSR index of SATP.
pub const CSR_SATP: u16 = 0x180;
/// CSR index of MSTATUS.
pub const CSR_MSTATUS: u16 = 0x300;

const SATP_MODE_HI: u32 = 63;
const SATP_MODE_LO: u32 = 60;
const SATP_PPN_HI: u32 = 43;
const SATP_PPN_LO: u32 = 0;

const SATP_MODE_BARE: u64 = 0;
const SATP_MODE_SV39: u64 = 8;
const SATP_MODE_SV48: u64 = 9;
const SATP_MODE_SV57: u64 = 10;

const MSTATUS_SUM_BIT: u32 = 18;
const MSTATUS_MXR_BIT: u32 = 19;

/// SATP: translation mode and root page-table PPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Satp {
    pub mode: TranslationMode,
    pub ppn: Ppn,
}

impl Satp {
    #[must_use]
    pub const fn new(mode: TranslationMode, ppn: Ppn) -> Self {
        Self { mode, ppn }
    }

    /// Raw 64-bit register image.
    #[must_use]
    pub fn to_raw(self) -> u64 {
        let mode = match self.mode {
            TranslationMode::Bare => SATP_MODE_BARE,
            TranslationMode::Sv39 => SATP_MODE_SV39,
            TranslationMode::Sv48 => SATP_MODE_SV48,
            TranslationMode::Sv57 => SATP_MODE_SV57,
        };

        let raw = bits::set_bit_field(SATP_MODE_HI, SATP_MODE_LO, 0, mode);
        bits::set_bit_field(SATP_PPN_HI, SATP_PPN_LO, raw, self.ppn)
    }

    /// Decode a raw register image; `None` for unsupported MODE encodings.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        let mode = match bits::bit_field(SATP_MODE_HI, SATP_MODE_LO, raw) {
            SATP_MODE_BARE => TranslationMode::Bare,
            SATP_MODE_SV39 => TranslationMode::Sv39,
            SATP_MODE_SV48 => TranslationMode::Sv48,
            SATP_MODE_SV57 => TranslationMode::Sv57,
            _ => return None,
        };

        Some(Self {
            mode,
            ppn: bits::bit_field(SATP_PPN_HI, SATP_PPN_LO, raw),
        })
    }
}

/// The MSTATUS fields translation consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mstatus {
    /// Make-executable-readable.
    pub mxr: bool,
    /// Permit supervisor access to user pages.
    pub sum: bool,
}

impl Mstatus {
    #[must_use]
    pub fn to_raw(self) -> u64 {
        (u64::from(self.mxr) << MSTATUS_MXR_BIT) | (u64::from(self.sum) << MSTATUS_SUM_BIT)
    }

    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self {
            mxr: raw & (1 << MSTATUS_MXR_BIT) != 0,
            sum: raw & (1 << MSTATUS_SUM_BIT) != 0,
        }
    }
}

/// The CSR store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrFile {
    satp: Satp,
    mstatus: Mstatus,
}

impl CsrFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn satp(&self) -> Satp {
        self.satp
    }

    #[must_use]
    pub const fn mstatus(&self) -> Mstatus {
        self.mstatus
    }

    pub fn set_satp(&mut self, satp: Satp) {
        self.satp = satp;
    }

    pub fn set_mstatus(&mut self, mstatus: Mstatus) {
        self.mstatus = mstatus;
    }

    /// Raw CSR read by index.
    pub fn read(&self, idx: u16) -> Result<u64, SimStatus> {
        match idx {
            CSR_SATP => Ok(self.satp.to_raw()),
            CSR_MSTATUS => Ok(self.mstatus.to_raw()),
            _ => Err(SimStatus::CsrNotSupported),
        }
    }

    /// Raw CSR write by index. Unsupported indices and unsupported SATP
    /// mode encodings are rejected untouched.
    pub fn write(&mut self, idx: u16, value: u64) -> Result<(), SimStatus> {
        match idx {
            CSR_SATP => {
                self.satp = Satp::from_raw(value).ok_or(SimStatus::CsrNotSupported)?;
                Ok(())
            }
            CSR_MSTATUS => {
                self.mstatus = Mstatus::from_raw(value);
                Ok(())
            }
            _ => Err(SimStatus::CsrNotSupported),
        }
    }
}
