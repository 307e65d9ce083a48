//! STM32L4 flash controller register map.
//!
//! Offsets, bit assignments and key values from RM0351 (STM32L47x/48x).
//! The layout is shared across the L4 series, with the WRP2/PCROP2 block
//! only populated on dual-bank parts.

use bitflags::bitflags;

/// Target address of the DBGMCU ID-code register: low 12 bits are the part
/// id, high 16 bits the revision code.
pub const DBGMCU_IDCODE: u32 = 0xE004_2000;

/// Base address of the flash address space (bank 1).
pub const FLASH_BASE_ADDRESS: u32 = 0x0800_0000;

/// First KEYR unlock key.
pub const KEY1: u32 = 0x4567_0123;
/// Second KEYR unlock key.
pub const KEY2: u32 = 0xCDEF_89AB;
/// First OPTKEYR unlock key.
pub const OPTKEY1: u32 = 0x0819_2A3B;
/// Second OPTKEYR unlock key.
pub const OPTKEY2: u32 = 0x4C5D_6E7F;

/// Register offsets from the controller base.
///
/// This is the complete set of registers the driver touches; all register
/// I/O goes through it, so a register address is always
/// `regs_base + FlashReg::offset()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(u32)]
pub enum FlashReg {
    Acr = 0x00,
    PdKeyr = 0x04,
    Keyr = 0x08,
    OptKeyr = 0x0C,
    Sr = 0x10,
    Cr = 0x14,
    Ecr = 0x18,
    Optr = 0x20,
    Pcrop1Sr = 0x24,
    Pcrop1Er = 0x28,
    Wrp1Ar = 0x2C,
    Wrp1Br = 0x30,
    Pcrop2Sr = 0x44,
    Pcrop2Er = 0x48,
    Wrp2Ar = 0x4C,
    Wrp2Br = 0x50,
}

impl FlashReg {
    /// Byte offset of the register from the controller base.
    pub fn offset(self) -> u32 {
        self as u32
    }
}

bitflags! {
    /// FLASH_CR, the flash control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cr: u32 {
        /// Programming enable.
        const PG = 1 << 0;
        /// Page (sector) erase.
        const PER = 1 << 1;
        /// Bank 1 mass erase.
        const MER1 = 1 << 2;
        /// Bank selector for page erase (dual-bank parts).
        const BKER = 1 << 11;
        /// Bank 2 mass erase (dual-bank parts).
        const MER2 = 1 << 15;
        /// Start the erase operation selected by PER/MER1/MER2.
        const START = 1 << 16;
        /// Start the option-byte programming cycle.
        const OPTSTRT = 1 << 17;
        /// Fast programming.
        const FSTPG = 1 << 18;
        /// Force option-byte reload.
        const OBL_LAUNCH = 1 << 27;
        /// Option-register lock.
        const OPTLOCK = 1 << 30;
        /// Main register lock.
        const LOCK = 1 << 31;
    }
}

impl Cr {
    /// Page number field (PNB), bits [10:3].
    pub fn pnb(sector: u32) -> Cr {
        Cr::from_bits_retain(sector << 3)
    }
}

bitflags! {
    /// FLASH_SR, the flash status register. Error flags are write-one-to-clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sr: u32 {
        /// End of operation.
        const EOP = 1 << 0;
        /// Operation error.
        const OPERR = 1 << 1;
        /// Programming error (write to a non-erased word).
        const PROGERR = 1 << 3;
        /// Write protection error.
        const WRPERR = 1 << 4;
        /// Programming alignment error.
        const PGAERR = 1 << 5;
        /// Programming parallelism error.
        const PGPERR = 1 << 6;
        /// Programming sequence error.
        const PGSERR = 1 << 7;
        /// Fast programming data miss.
        const MISERR = 1 << 8;
        /// Fast programming error.
        const FASTERR = 1 << 9;
        /// Read (PCROP) protection error.
        const RDERR = 1 << 14;
        /// Option validity error.
        const OPTVERR = 1 << 15;
        /// Operation in progress.
        const BSY = 1 << 16;

        /// All latching error flags.
        const ERRORS = Self::OPERR.bits()
            | Self::PROGERR.bits()
            | Self::WRPERR.bits()
            | Self::PGAERR.bits()
            | Self::PGPERR.bits()
            | Self::PGSERR.bits()
            | Self::MISERR.bits()
            | Self::FASTERR.bits()
            | Self::RDERR.bits()
            | Self::OPTVERR.bits();
    }
}

bitflags! {
    /// FLASH_OPTR, the option register. RDP occupies bits [7:0]; everything
    /// above is the 24-bit user-option field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Optr: u32 {
        /// Independent watchdog: software (set) or hardware (clear).
        const IWDG_SW = 1 << 16;
        /// Freeze the independent watchdog counter in Stop mode.
        const IWDG_STOP = 1 << 17;
        /// Freeze the independent watchdog counter in Standby mode.
        const IWDG_STDBY = 1 << 18;
        /// Window watchdog: software (set) or hardware (clear).
        const WWDG_SW = 1 << 19;
        /// Dual-bank operation on underpopulated parts.
        const DUALBANK = 1 << 21;
        /// Dual-bank mode (page-size halving) on the L4R/L4S series.
        const DBANK = 1 << 22;
    }
}

/// RDP level meaning "no readout protection". Any other value raises the
/// level once programmed (0xCC is Level 2, which is irreversible).
pub const RDP_NONE: u8 = 0xAA;
