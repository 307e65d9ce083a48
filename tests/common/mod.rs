//! A scripted STM32L4-ish target.
//!
//! `MockTarget` models just enough of the device for end-to-end driver
//! tests: the flash controller's lock/key machinery, the latching status
//! register, WRP zone enforcement, the factory ID/size words, a bump
//! working-area allocator, and a flash-algorithm runner that behaves like
//! the on-target loader. Its geometry knobs are configured per test and are
//! deliberately independent of the driver's own registry, so the tests
//! check the driver against "the silicon", not against itself.

// Each test binary compiles its own copy of this module and none of them
// uses every knob.
#![allow(dead_code)]

use flashbank::target::{AlgorithmError, FlashAlgorithm, Target, TargetState, WorkingArea};

pub const REGS_BASE: u32 = 0x4002_2000;
pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FSIZE_ADDR: u32 = 0x1FFF_75E0;
pub const IDCODE_ADDR: u32 = 0xE004_2000;
pub const RAM_BASE: u32 = 0x2000_0000;

// FLASH_CR bits.
pub const PG: u32 = 1 << 0;
pub const PER: u32 = 1 << 1;
pub const MER1: u32 = 1 << 2;
pub const BKER: u32 = 1 << 11;
pub const MER2: u32 = 1 << 15;
pub const START: u32 = 1 << 16;
pub const OPTSTRT: u32 = 1 << 17;
pub const OPTLOCK: u32 = 1 << 30;
pub const LOCK: u32 = 1 << 31;

// FLASH_SR bits.
pub const WRPERR: u32 = 1 << 4;
pub const PGAERR: u32 = 1 << 5;
pub const SR_ERRORS: u32 = 0xC3FA;

// FLASH_OPTR bits.
pub const IWDG_STOP: u32 = 1 << 17;
pub const DUALBANK: u32 = 1 << 21;
pub const DBANK: u32 = 1 << 22;

/// The canonical "no zone" WRP register value.
pub const WRP_EMPTY: u32 = 0x0000_00FF;

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;
const OPTKEY1: u32 = 0x0819_2A3B;
const OPTKEY2: u32 = 0x4C5D_6E7F;

/// A transport-level failure of the simulated debug link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault(pub &'static str);

impl std::fmt::Display for BusFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus fault: {}", self.0)
    }
}

pub struct MockTarget {
    pub state: TargetState,
    pub idcode: u32,
    pub fsize_kb: u16,

    /// The simulated silicon's own layout, used for erase decoding and WRP
    /// enforcement.
    pub page_size: u32,
    pub first_bank_pages: u32,

    pub flash: Vec<u8>,

    pub cr: u32,
    pub sr: u32,
    pub optr: u32,
    pub wrp1ar: u32,
    pub wrp1br: u32,
    pub wrp2ar: u32,
    pub wrp2br: u32,

    key_stage: u8,
    optkey_stage: u8,
    pub ignore_keys: bool,

    ram_top: u32,
    pub ram_limit: u32,
    pub live_areas: i32,

    /// Every value the driver wrote to CR, applied or not.
    pub cr_writes: Vec<u32>,
    /// Uploaded loader blobs: `(address, length)`.
    pub loader_uploads: Vec<(u32, usize)>,
    /// Error bits latched into SR by the next started operation.
    pub inject_sr_on_start: u32,
    /// Address whose reads fail with a bus fault.
    pub fail_read_at: Option<u32>,
}

impl MockTarget {
    pub fn new(idcode: u32, fsize_kb: u16, optr: u32) -> MockTarget {
        let flash_bytes = u32::from(fsize_kb) * 1024;
        MockTarget {
            state: TargetState::Halted,
            idcode,
            fsize_kb,
            page_size: 2048,
            // Single bank unless a test says otherwise: every page lives in
            // bank 1.
            first_bank_pages: flash_bytes / 2048,
            flash: vec![0xFF; flash_bytes as usize],
            cr: LOCK | OPTLOCK,
            sr: 0,
            optr,
            wrp1ar: WRP_EMPTY,
            wrp1br: WRP_EMPTY,
            wrp2ar: WRP_EMPTY,
            wrp2br: WRP_EMPTY,
            key_stage: 0,
            optkey_stage: 0,
            ignore_keys: false,
            ram_top: RAM_BASE,
            ram_limit: 64 * 1024,
            live_areas: 0,
            cr_writes: Vec::new(),
            loader_uploads: Vec::new(),
            inject_sr_on_start: 0,
            fail_read_at: None,
        }
    }

    /// Split the simulated flash into two banks of `first_bank_pages`
    /// pages each (bank 2 pages are WRP-checked against the WRP2 zones).
    pub fn with_banks(mut self, first_bank_pages: u32) -> MockTarget {
        self.first_bank_pages = first_bank_pages;
        self
    }

    pub fn locked(&self) -> bool {
        self.cr & LOCK != 0
    }

    fn zone_contains(zone: u32, page: u32) -> bool {
        let start = zone & 0xFF;
        let end = (zone >> 16) & 0xFF;
        start <= end && page >= start && page <= end
    }

    /// WRP check for a flat page index.
    fn page_protected(&self, page: u32) -> bool {
        if page < self.first_bank_pages {
            Self::zone_contains(self.wrp1ar, page) || Self::zone_contains(self.wrp1br, page)
        } else {
            let rel = page - self.first_bank_pages;
            Self::zone_contains(self.wrp2ar, rel) || Self::zone_contains(self.wrp2br, rel)
        }
    }

    fn erase_page(&mut self, page: u32) {
        let start = (page * self.page_size) as usize;
        let end = start + self.page_size as usize;
        if end <= self.flash.len() {
            self.flash[start..end].fill(0xFF);
        }
    }

    fn start_operation(&mut self, cr: u32) {
        self.sr |= self.inject_sr_on_start;
        self.inject_sr_on_start = 0;

        if cr & PER != 0 {
            // The PNB field is eight bits; an out-of-bank sector number
            // wraps, which is exactly how the inter-bank hole disappears.
            let pnb = (cr >> 3) & 0xFF;
            let page = if cr & BKER != 0 {
                self.first_bank_pages + pnb
            } else {
                pnb
            };
            let bank_relative = pnb;
            let protected = if cr & BKER != 0 {
                Self::zone_contains(self.wrp2ar, bank_relative)
                    || Self::zone_contains(self.wrp2br, bank_relative)
            } else {
                Self::zone_contains(self.wrp1ar, bank_relative)
                    || Self::zone_contains(self.wrp1br, bank_relative)
            };
            if protected {
                self.sr |= WRPERR;
            } else {
                self.erase_page(page);
            }
        }
        if cr & MER1 != 0 {
            let end = (self.first_bank_pages * self.page_size).min(self.flash.len() as u32);
            self.flash[..end as usize].fill(0xFF);
        }
        if cr & MER2 != 0 {
            let start = (self.first_bank_pages * self.page_size).min(self.flash.len() as u32);
            self.flash[start as usize..].fill(0xFF);
        }
    }
}

impl Target for MockTarget {
    type Error = BusFault;

    fn state(&mut self) -> TargetState {
        self.state
    }

    fn read_u16(&mut self, addr: u32) -> Result<u16, Self::Error> {
        if self.fail_read_at == Some(addr) {
            return Err(BusFault("read_u16"));
        }
        match addr {
            FSIZE_ADDR => Ok(self.fsize_kb),
            _ => Err(BusFault("unmapped halfword read")),
        }
    }

    fn read_u32(&mut self, addr: u32) -> Result<u32, Self::Error> {
        if self.fail_read_at == Some(addr) {
            return Err(BusFault("read_u32"));
        }
        if addr == IDCODE_ADDR {
            return Ok(self.idcode);
        }
        if (FLASH_BASE..FLASH_BASE + self.flash.len() as u32).contains(&addr) {
            let i = (addr - FLASH_BASE) as usize;
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&self.flash[i..i + 4]);
            return Ok(u32::from_le_bytes(bytes));
        }
        match addr.wrapping_sub(REGS_BASE) {
            0x10 => Ok(self.sr),
            0x14 => Ok(self.cr),
            0x20 => Ok(self.optr),
            0x2C => Ok(self.wrp1ar),
            0x30 => Ok(self.wrp1br),
            0x4C => Ok(self.wrp2ar),
            0x50 => Ok(self.wrp2br),
            _ => Err(BusFault("unmapped word read")),
        }
    }

    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), Self::Error> {
        match addr.wrapping_sub(REGS_BASE) {
            // KEYR
            0x08 => {
                if !self.ignore_keys {
                    match (self.key_stage, value) {
                        (0, KEY1) => self.key_stage = 1,
                        (1, KEY2) => {
                            self.cr &= !LOCK;
                            self.key_stage = 0;
                        }
                        _ => self.key_stage = 0,
                    }
                }
                Ok(())
            }
            // OPTKEYR
            0x0C => {
                if !self.ignore_keys {
                    match (self.optkey_stage, value) {
                        (0, OPTKEY1) => self.optkey_stage = 1,
                        (1, OPTKEY2) => {
                            self.cr &= !OPTLOCK;
                            self.optkey_stage = 0;
                        }
                        _ => self.optkey_stage = 0,
                    }
                }
                Ok(())
            }
            // SR: error bits are write-one-to-clear.
            0x10 => {
                self.sr &= !(value & SR_ERRORS);
                Ok(())
            }
            // CR: ignored while locked; OPTLOCK is sticky until the key
            // sequence clears it.
            0x14 => {
                self.cr_writes.push(value);
                if self.cr & LOCK == 0 {
                    self.cr = value | (self.cr & OPTLOCK);
                    if value & (START | OPTSTRT) != 0 {
                        self.start_operation(value);
                    }
                }
                Ok(())
            }
            0x20 => {
                if self.cr & OPTLOCK == 0 {
                    self.optr = value;
                }
                Ok(())
            }
            0x2C => {
                if self.cr & OPTLOCK == 0 {
                    self.wrp1ar = value;
                }
                Ok(())
            }
            0x30 => {
                if self.cr & OPTLOCK == 0 {
                    self.wrp1br = value;
                }
                Ok(())
            }
            0x4C => {
                if self.cr & OPTLOCK == 0 {
                    self.wrp2ar = value;
                }
                Ok(())
            }
            0x50 => {
                if self.cr & OPTLOCK == 0 {
                    self.wrp2br = value;
                }
                Ok(())
            }
            _ => Err(BusFault("unmapped word write")),
        }
    }

    fn write_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        if addr < RAM_BASE {
            return Err(BusFault("loader upload outside RAM"));
        }
        self.loader_uploads.push((addr, data.len()));
        Ok(())
    }

    fn try_alloc_working_area(&mut self, size: u32) -> Option<WorkingArea> {
        if self.ram_top + size > RAM_BASE + self.ram_limit {
            return None;
        }
        let area = WorkingArea {
            address: self.ram_top,
            size,
        };
        self.ram_top += size;
        self.live_areas += 1;
        Some(area)
    }

    fn free_working_area(&mut self, _area: WorkingArea) {
        self.live_areas -= 1;
    }

    fn run_flash_algorithm(
        &mut self,
        algorithm: &FlashAlgorithm<'_>,
        regs: &mut [u32],
    ) -> Result<(), AlgorithmError<Self::Error>> {
        assert_eq!(algorithm.block_size, 8, "the loader programs 64-bit words");
        assert_eq!(
            algorithm.payload.len(),
            algorithm.block_count as usize * 8,
            "payload must be whole blocks"
        );
        assert!(
            self.loader_uploads.iter().any(|(addr, _)| *addr == algorithm.entry),
            "no loader uploaded at the entry point"
        );
        assert_eq!(regs[0], algorithm.ring.address);
        assert_eq!(regs[1], algorithm.ring.address + algorithm.ring.size);

        let mut addr = regs[2];
        for block in algorithm.payload.chunks(8) {
            let page = (addr - FLASH_BASE) / self.page_size;
            if self.page_protected(page) {
                self.sr |= WRPERR;
                regs[0] = self.sr;
                return Err(AlgorithmError::FlashOpFailed);
            }
            let i = (addr - FLASH_BASE) as usize;
            self.flash[i..i + 8].copy_from_slice(block);
            addr += 8;
        }
        regs[0] = 0;
        Ok(())
    }
}
