//! The on-target write loader.
//!
//! Standard programming pokes every 64-bit flash word over the debug link
//! with the BSY poll in between, dominated by link round trips. The loader
//! below runs on the target instead: the host streams data into a FIFO ring
//! in target RAM (see [`crate::target::algorithm`]) while the loader drains
//! it, programs one flash word per block, and polls BSY locally.
//!
//! The payload is position-independent Thumb code for Cortex-M (ARMv6-M
//! subset plus `dsb`), assembled out of band from `loaders/stm32l4x.S`. Per
//! flash word it sets CR.PG, copies the low then the high 32-bit half to the
//! flash address with a barrier after each, waits for BSY, and checks the
//! low SR byte for errors. On an error it zeroes the ring's read pointer to
//! stop the host feeder and halts with the latched SR byte in `r0`; on
//! completion it halts with `r0 = 0`.

/// Register values the loader expects on entry.
///
/// `ring_start` doubles as the FIFO pointer block: the loader reads the
/// host's write pointer from `[r0]` and keeps its read pointer at `[r0+4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoaderParams {
    /// Ring working-area start (pointer words, then data). Goes in `r0`,
    /// which carries the outcome word back when the loader halts.
    pub ring_start: u32,
    /// Ring working-area end, exclusive. Goes in `r1`.
    pub ring_end: u32,
    /// Address of the first flash word to program. Goes in `r2`.
    pub flash_address: u32,
    /// Number of 64-bit words to program. Goes in `r3`.
    pub word_count: u32,
    /// Flash controller register base. Goes in `r4`.
    pub regs_base: u32,
}

impl LoaderParams {
    pub(crate) fn to_regs(self) -> [u32; 5] {
        [
            self.ring_start,
            self.ring_end,
            self.flash_address,
            self.word_count,
            self.regs_base,
        ]
    }
}

/// The assembled loader. See `loaders/stm32l4x.S` for the listing.
#[rustfmt::skip]
pub(crate) const WRITE_LOADER: &[u8] = &[
    0x07, 0x68, 0x00, 0x2f, 0x23, 0xd0, 0x45, 0x68, 0x7e, 0x1b, 0x18, 0xd4,
    0x08, 0x2e, 0xf7, 0xd3, 0x01, 0x26, 0x66, 0x61, 0x40, 0xcd, 0x40, 0xc2,
    0xbf, 0xf3, 0x4f, 0x8f, 0x40, 0xcd, 0x40, 0xc2, 0xbf, 0xf3, 0x4f, 0x8f,
    0x26, 0x69, 0x76, 0x0c, 0xfc, 0xd2, 0x26, 0x69, 0xf6, 0xb2, 0x00, 0x2e,
    0x0b, 0xd1, 0x8d, 0x42, 0x06, 0xd2, 0x45, 0x60, 0x01, 0x3b, 0x08, 0xd0,
    0xe0, 0xe7, 0x0e, 0x44, 0x36, 0x1a, 0xe3, 0xe7, 0x05, 0x46, 0x08, 0x35,
    0xf5, 0xe7, 0x00, 0x21, 0x41, 0x60, 0x30, 0x46, 0x00, 0xbe,
];
