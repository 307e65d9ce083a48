//! Option bytes: readout protection, watchdog selections and WRP zones.
//!
//! The controller exposes the option bytes through OPTR and the WRPxyR
//! range registers. The driver keeps a decoded copy in [`OptionBytes`];
//! [`read_options`](super::Stm32l4xFlash::read_options) refreshes it from
//! the device and [`write_options`](super::Stm32l4xFlash::write_options)
//! programs it back. New values only take effect after the device is reset
//! or power cycled.

use crate::stm32l4x::regs::{Optr, RDP_NONE};

/// A write-protection zone: an inclusive range of bank-relative sector
/// numbers. The hardware treats `start > end` as "no zone"; the canonical
/// empty encoding is [`WrpZone::EMPTY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrpZone {
    /// First protected sector, bits [7:0] of the range register.
    pub start: u8,
    /// Last protected sector, bits [23:16] of the range register.
    pub end: u8,
}

impl WrpZone {
    /// The canonical "no zone" encoding.
    pub const EMPTY: WrpZone = WrpZone { start: 0xFF, end: 0 };

    /// Whether the zone protects nothing.
    pub fn is_empty(self) -> bool {
        self.start > self.end
    }

    /// Whether the zone covers the given bank-relative sector number.
    pub fn contains(self, sector: u32) -> bool {
        sector >= u32::from(self.start) && sector <= u32::from(self.end)
    }

    pub(crate) fn from_bits(bits: u32) -> WrpZone {
        WrpZone {
            start: bits as u8,
            end: (bits >> 16) as u8,
        }
    }

    pub(crate) fn to_bits(self) -> u32 {
        (u32::from(self.end) << 16) | u32::from(self.start)
    }
}

/// Decoded option bytes of one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionBytes {
    /// The raw 24-bit user-option field, OPTR bits [31:8].
    pub user_options: u32,
    /// Readout protection level byte. `0xAA` means none; any other value
    /// raises the level once programmed.
    pub rdp: u8,
    /// Window watchdog software selection (WWDG_SW).
    pub window_watchdog_soft_selection: bool,
    /// Independent watchdog frozen in Standby (IWDG_STDBY).
    pub independent_watchdog_standby: bool,
    /// Independent watchdog frozen in Stop (IWDG_STOP).
    pub independent_watchdog_stop: bool,
    /// Independent watchdog software selection (IWDG_SW).
    pub independent_watchdog_soft_selection: bool,
    /// Bank 1 WRP zone A.
    pub wrp1a: WrpZone,
    /// Bank 1 WRP zone B.
    pub wrp1b: WrpZone,
    /// Bank 2 WRP zone A (dual-bank parts).
    pub wrp2a: WrpZone,
    /// Bank 2 WRP zone B (dual-bank parts).
    pub wrp2b: WrpZone,
}

impl Default for OptionBytes {
    fn default() -> Self {
        OptionBytes {
            user_options: 0,
            rdp: RDP_NONE,
            window_watchdog_soft_selection: false,
            independent_watchdog_standby: false,
            independent_watchdog_stop: false,
            independent_watchdog_soft_selection: false,
            wrp1a: WrpZone::EMPTY,
            wrp1b: WrpZone::EMPTY,
            wrp2a: WrpZone::EMPTY,
            wrp2b: WrpZone::EMPTY,
        }
    }
}

impl OptionBytes {
    /// Refresh the OPTR-derived fields from a raw register value. The WRP
    /// zones are read from their own registers and left untouched here.
    pub(crate) fn decode_optr(&mut self, bits: u32) {
        let optr = Optr::from_bits_retain(bits);
        self.user_options = bits >> 8;
        self.rdp = bits as u8;
        self.window_watchdog_soft_selection = optr.contains(Optr::WWDG_SW);
        self.independent_watchdog_standby = optr.contains(Optr::IWDG_STDBY);
        self.independent_watchdog_stop = optr.contains(Optr::IWDG_STOP);
        self.independent_watchdog_soft_selection = optr.contains(Optr::IWDG_SW);
    }

    /// Reassemble the OPTR value: the stored user options and RDP byte, with
    /// the four watchdog bits forced from their decoded flags.
    pub(crate) fn encode_optr(&self) -> u32 {
        let mut bits = (self.user_options << 8) | u32::from(self.rdp);
        for (flag, bit) in [
            (self.window_watchdog_soft_selection, Optr::WWDG_SW),
            (self.independent_watchdog_standby, Optr::IWDG_STDBY),
            (self.independent_watchdog_stop, Optr::IWDG_STOP),
            (self.independent_watchdog_soft_selection, Optr::IWDG_SW),
        ] {
            if flag {
                bits |= bit.bits();
            } else {
                bits &= !bit.bits();
            }
        }
        bits
    }

    /// Re-plan the WRP zones for protecting (or unprotecting) sectors
    /// `first..=last`, with bank 1 holding `first_bank_sectors` sectors.
    ///
    /// The encoding allows at most two zones per bank; this planner uses
    /// zone A of each affected bank and forces zone B empty. Zones outside
    /// the touched banks are left alone, but within an affected bank any
    /// previous zone is overwritten, not merged.
    pub(crate) fn plan_protection(
        &mut self,
        set: bool,
        first: u32,
        last: u32,
        first_bank_sectors: u32,
    ) {
        if last < first_bank_sectors {
            // Zone in first bank only.
            self.wrp1a = if set {
                WrpZone {
                    start: first as u8,
                    end: last as u8,
                }
            } else {
                WrpZone::EMPTY
            };
            self.wrp1b = WrpZone::EMPTY;
        } else if first >= first_bank_sectors {
            // Zone in second bank only.
            self.wrp2a = if set {
                WrpZone {
                    start: (first - first_bank_sectors) as u8,
                    end: (last - first_bank_sectors) as u8,
                }
            } else {
                WrpZone::EMPTY
            };
            self.wrp2b = WrpZone::EMPTY;
        } else {
            // Zone spread over the two banks.
            if set {
                self.wrp1a = WrpZone {
                    start: first as u8,
                    end: (first_bank_sectors - 1) as u8,
                };
                self.wrp2a = WrpZone {
                    start: 0,
                    end: (last - first_bank_sectors) as u8,
                };
            } else {
                self.wrp1a = WrpZone::EMPTY;
                self.wrp2a = WrpZone::EMPTY;
            }
            self.wrp1b = WrpZone::EMPTY;
            self.wrp2b = WrpZone::EMPTY;
        }
    }

    /// Whether the zones cover the given driver-level sector index, with
    /// bank 1 holding `first_bank_sectors` sectors.
    pub(crate) fn sector_protected(&self, index: u32, first_bank_sectors: u32) -> bool {
        if index < first_bank_sectors {
            self.wrp1a.contains(index) || self.wrp1b.contains(index)
        } else {
            let bank2 = index - first_bank_sectors;
            self.wrp2a.contains(bank2) || self.wrp2b.contains(bank2)
        }
    }
}
