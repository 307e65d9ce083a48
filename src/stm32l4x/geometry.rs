//! Probe-time bank geometry.
//!
//! A [`ResolvedGeometry`] is the bank's own copy of everything layout
//! related: the registry values of the probed part, adjusted by the flash
//! size the device actually reports and by the option bits that change the
//! bank arrangement. The registry itself is never mutated.

use crate::driver::{Erased, Sector};
use crate::stm32l4x::parts::PartDescriptor;
use crate::stm32l4x::regs::{Cr, Optr, FLASH_BASE_ADDRESS};

/// The layout of a probed bank.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedGeometry {
    /// The registry entry the probe matched.
    pub part: &'static PartDescriptor,
    /// Bank base in target address space.
    pub base: u32,
    /// Usable flash size in bytes.
    pub size: u32,
    /// Erase-sector size in bytes, after option-bit adjustments.
    pub page_size: u32,
    /// Number of sectors in bank 1.
    pub first_bank_sectors: u32,
    /// Sector numbers skipped between banks. On an underpopulated device
    /// running in dual-bank mode, bank 2 starts at the controller sector
    /// number where the fully populated part's bank 2 would, leaving a hole
    /// in the numbering.
    pub hole_sectors: u32,
}

impl ResolvedGeometry {
    /// Combine a registry entry with the probed flash size and option bits.
    ///
    /// `flash_kb` is the size reported by the device (already validated
    /// against the registry maximum); `configured_size` is a host-configured
    /// override in bytes, taking precedence over `flash_kb` for the bank
    /// size but not for the bank-split computation: the split reflects what
    /// the silicon does, not what the user claims.
    pub(crate) fn resolve(
        part: &'static PartDescriptor,
        flash_kb: u32,
        optr: Optr,
        configured_size: Option<u32>,
    ) -> ResolvedGeometry {
        let mut page_size = part.page_size;
        let mut first_bank_sectors = part.first_bank_sectors;
        let mut hole_sectors = part.hole_sectors;

        if part.dual_bank {
            if part.id == 0x470 && !optr.contains(Optr::DBANK) {
                // DBANK cleared: the two 4 KiB-page banks fuse into one
                // 8 KiB-page bank.
                page_size = 8192;
            } else if optr.contains(Optr::DUALBANK) && flash_kb < part.max_flash_kb {
                first_bank_sectors = (flash_kb * 1024 / page_size) / 2;
                hole_sectors = (part.max_flash_kb * 1024 / page_size) / 2 - first_bank_sectors;
            }
        }

        let size = match configured_size {
            Some(bytes) => bytes,
            None => flash_kb * 1024,
        };

        ResolvedGeometry {
            part,
            base: FLASH_BASE_ADDRESS,
            size,
            page_size,
            first_bank_sectors,
            hole_sectors,
        }
    }

    /// Number of sectors in the bank.
    pub fn num_sectors(&self) -> usize {
        (self.size / self.page_size) as usize
    }

    /// The CR value that erases sector `index`: PER plus the controller
    /// sector number, with BKER asserted and the inter-bank hole skipped for
    /// sectors beyond bank 1, plus START.
    pub(crate) fn erase_command(&self, index: usize) -> Cr {
        let index = index as u32;
        if index < self.first_bank_sectors {
            Cr::PER | Cr::pnb(index) | Cr::START
        } else {
            Cr::BKER | Cr::PER | Cr::pnb(index + self.hole_sectors) | Cr::START
        }
    }

    /// Build a fresh sector table: erase state unknown, protection assumed
    /// until a protect check says otherwise.
    pub(crate) fn build_sectors(&self) -> Vec<Sector> {
        (0..self.num_sectors() as u32)
            .map(|i| Sector {
                offset: i * self.page_size,
                size: self.page_size,
                erased: Erased::Unknown,
                protected: true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stm32l4x::parts;

    #[test]
    fn fully_populated_dual_bank() {
        let part = parts::lookup(0x415).unwrap();
        let geom = ResolvedGeometry::resolve(part, 1024, Optr::DUALBANK, None);
        assert_eq!(geom.page_size, 2048);
        assert_eq!(geom.num_sectors(), 512);
        assert_eq!(geom.first_bank_sectors, 256);
        assert_eq!(geom.hole_sectors, 0);

        let sectors = geom.build_sectors();
        assert_eq!(sectors[255].offset, 0x7F800);
        assert_eq!(sectors[256].offset, 0x80000);
    }

    #[test]
    fn underpopulated_dual_bank_has_a_hole() {
        let part = parts::lookup(0x415).unwrap();
        let geom = ResolvedGeometry::resolve(part, 512, Optr::DUALBANK, None);
        assert_eq!(geom.num_sectors(), 256);
        assert_eq!(geom.first_bank_sectors, 128);
        assert_eq!(geom.hole_sectors, 128);

        // Bank 2's first sector erases as controller sector 256.
        let cr = geom.erase_command(128);
        assert_eq!(cr, Cr::BKER | Cr::PER | Cr::pnb(256) | Cr::START);
    }

    #[test]
    fn underpopulated_single_bank_mode_is_flat() {
        let part = parts::lookup(0x415).unwrap();
        let geom = ResolvedGeometry::resolve(part, 512, Optr::empty(), None);
        assert_eq!(geom.first_bank_sectors, 256);
        assert_eq!(geom.hole_sectors, 0);
        assert_eq!(geom.erase_command(128), Cr::PER | Cr::pnb(128) | Cr::START);
    }

    #[test]
    fn l4r_with_dbank_cleared_doubles_the_page() {
        let part = parts::lookup(0x470).unwrap();
        let geom = ResolvedGeometry::resolve(part, 2048, Optr::empty(), None);
        assert_eq!(geom.page_size, 8192);
        assert_eq!(geom.num_sectors(), 256);

        let geom = ResolvedGeometry::resolve(part, 2048, Optr::DBANK, None);
        assert_eq!(geom.page_size, 4096);
        assert_eq!(geom.num_sectors(), 512);
    }

    #[test]
    fn configured_size_overrides_probed_size() {
        let part = parts::lookup(0x435).unwrap();
        let geom = ResolvedGeometry::resolve(part, 256, Optr::empty(), Some(64 * 1024));
        assert_eq!(geom.size, 64 * 1024);
        assert_eq!(geom.num_sectors(), 32);
    }

    #[test]
    fn sector_table_tiles_the_bank() {
        let part = parts::lookup(0x462).unwrap();
        let geom = ResolvedGeometry::resolve(part, 512, Optr::empty(), None);
        let sectors = geom.build_sectors();
        assert_eq!(sectors.iter().map(|s| s.size).sum::<u32>(), geom.size);
        for pair in sectors.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].size);
        }
        assert!(sectors.iter().all(|s| s.protected));
        assert!(sectors.iter().all(|s| s.erased == Erased::Unknown));
    }
}
