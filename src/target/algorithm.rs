//! Conventions for the host's asynchronous flash-algorithm runner.
//!
//! Bulk programming does not poke flash words over the debug link one at a
//! time. Instead, the driver uploads a small loader to target RAM and hands
//! the host a [`FlashAlgorithm`] describing how to feed it: the runner
//! streams the payload into a circular scratch buffer on the target while
//! the loader drains it and programs flash, so link transfers and flash
//! programming overlap.
//!
//! ## The FIFO ring
//!
//! The scratch ring starts with two 32-bit pointer words, followed by data:
//!
//! ```text
//! ring+0x0: write pointer, maintained by the host runner
//! ring+0x4: read pointer,  maintained by the loader
//! ring+0x8: data ........ wraps back to ring+0x8 at the ring's end
//! ```
//!
//! The runner advances the write pointer only after a block's bytes are
//! fully in place, and never reuses a slot before the loader's read pointer
//! has moved past it; the loader consumes whole blocks and advances the read
//! pointer afterwards. A loader signals abort by zeroing the read pointer.
//!
//! Blocks are `block_size` bytes and the runner feeds exactly `block_count`
//! of them, so the payload must be `block_size * block_count` bytes long.

use crate::target::WorkingArea;

/// Describes one invocation of a target-resident flash loader.
#[derive(Debug)]
pub struct FlashAlgorithm<'a> {
    /// The host-side data to stream into the ring.
    pub payload: &'a [u8],
    /// Size in bytes of one unit of work (one programming operation).
    pub block_size: u32,
    /// Number of blocks in the payload.
    pub block_count: u32,
    /// The scratch ring working area (pointer words + data).
    pub ring: &'a WorkingArea,
    /// Target address of the loader's first instruction.
    pub entry: u32,
}

/// An error reported by the flash-algorithm runner.
#[derive(Debug, PartialEq, Eq)]
pub enum AlgorithmError<E> {
    /// A debug-link operation failed while feeding or supervising the
    /// loader.
    Transport(E),
    /// The loader halted reporting failure (or aborted the stream). The
    /// register slots passed to
    /// [`run_flash_algorithm`](crate::target::Target::run_flash_algorithm)
    /// hold the loader's final register values; drivers recover their
    /// loader-specific fault word from there.
    FlashOpFailed,
}
