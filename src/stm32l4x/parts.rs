//! The STM32L4 part registry.
//!
//! A static table of every part the driver understands, keyed by the low 12
//! bits of the DBGMCU ID code. Entries are immutable; anything a probe
//! discovers about a concrete device (populated flash, option-dependent
//! bank layout) goes into the bank's own
//! [`ResolvedGeometry`](super::geometry::ResolvedGeometry), never back into
//! the table.

/// Geometry and identification data for one supported part.
#[derive(Debug)]
pub struct PartDescriptor {
    /// Device id, as found in DBGMCU_IDCODE bits [11:0].
    pub id: u16,
    /// Marketing name of the sub-family.
    pub name: &'static str,
    /// Known silicon revisions: `(rev code, rev letter)`.
    pub revisions: &'static [(u16, &'static str)],
    /// Erase-sector (page) size in bytes, before option-bit adjustments.
    pub page_size: u32,
    /// Largest flash population of the sub-family, in KiB.
    pub max_flash_kb: u32,
    /// Whether the part has a second bank (and the WRP2 register block).
    pub dual_bank: bool,
    /// Number of sectors in bank 1, before option-bit adjustments.
    pub first_bank_sectors: u32,
    /// Sector numbers skipped between banks on underpopulated dual-bank
    /// devices, before option-bit adjustments.
    pub hole_sectors: u32,
    /// Flash controller register base in target address space.
    pub regs_base: u32,
    /// Target address of the factory-programmed flash-size halfword.
    pub fsize_addr: u32,
}

impl PartDescriptor {
    /// Decode a revision code into its letter, if known.
    pub fn revision_str(&self, rev: u16) -> Option<&'static str> {
        self.revisions
            .iter()
            .find(|(code, _)| *code == rev)
            .map(|(_, s)| *s)
    }
}

static PARTS: &[PartDescriptor] = &[
    PartDescriptor {
        id: 0x415,
        name: "STM32L47/L48xx",
        revisions: &[(0x1000, "A"), (0x1001, "Z"), (0x1003, "Y"), (0x1007, "X")],
        page_size: 2048,
        max_flash_kb: 1024,
        dual_bank: true,
        first_bank_sectors: 256,
        hole_sectors: 0,
        regs_base: 0x4002_2000,
        fsize_addr: 0x1FFF_75E0,
    },
    PartDescriptor {
        id: 0x435,
        name: "STM32L43/L44xx",
        revisions: &[(0x1000, "A"), (0x1001, "Z")],
        page_size: 2048,
        max_flash_kb: 256,
        dual_bank: false,
        first_bank_sectors: 128,
        hole_sectors: 0,
        regs_base: 0x4002_2000,
        fsize_addr: 0x1FFF_75E0,
    },
    PartDescriptor {
        id: 0x462,
        name: "STM32L45/L46xx",
        revisions: &[(0x1000, "A"), (0x2000, "B")],
        page_size: 2048,
        max_flash_kb: 512,
        dual_bank: false,
        first_bank_sectors: 256,
        hole_sectors: 0,
        regs_base: 0x4002_2000,
        fsize_addr: 0x1FFF_75E0,
    },
    PartDescriptor {
        id: 0x461,
        name: "STM32L49/L4Axx",
        revisions: &[(0x1000, "A"), (0x2000, "B")],
        page_size: 2048,
        max_flash_kb: 1024,
        dual_bank: true,
        first_bank_sectors: 256,
        hole_sectors: 0,
        regs_base: 0x4002_2000,
        fsize_addr: 0x1FFF_75E0,
    },
    PartDescriptor {
        id: 0x470,
        name: "STM32L4R/L4Sxx",
        // 4 KiB pages in dual-bank mode; 8 KiB when the DBANK option bit is
        // cleared.
        revisions: &[(0x1000, "A"), (0x1001, "Z")],
        page_size: 4096,
        max_flash_kb: 2048,
        dual_bank: true,
        first_bank_sectors: 256,
        hole_sectors: 0,
        regs_base: 0x4002_2000,
        fsize_addr: 0x1FFF_75E0,
    },
];

/// Look up a part by raw ID code (only the low 12 bits are significant).
pub fn lookup(idcode: u32) -> Option<&'static PartDescriptor> {
    let id = (idcode & 0xFFF) as u16;
    PARTS.iter().find(|part| part.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_masks_to_twelve_bits() {
        let part = lookup(0x1007_6415).unwrap();
        assert_eq!(part.id, 0x415);
        assert_eq!(part.name, "STM32L47/L48xx");
    }

    #[test]
    fn lookup_rejects_unknown_ids() {
        assert!(lookup(0x999).is_none());
    }

    #[test]
    fn revisions_decode() {
        let part = lookup(0x415).unwrap();
        assert_eq!(part.revision_str(0x1003), Some("Y"));
        assert_eq!(part.revision_str(0x2000), None);
    }

    #[test]
    fn single_bank_parts_have_no_hole() {
        for part in super::PARTS {
            if !part.dual_bank {
                assert_eq!(part.hole_sectors, 0, "{}", part.name);
            }
        }
    }
}
