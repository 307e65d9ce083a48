//! The host-facing driver surface shared by all flash bank drivers.
//!
//! The host framework's flash layer holds each configured bank as a
//! [`FlashDriver`] trait object and dispatches user operations through it.
//! Family drivers keep their own state (probed geometry, option bytes,
//! sector table) behind the trait; the host owns the [`Target`] and lends it
//! to the driver for the duration of each call.

use core::fmt;

use crate::error::Error;
use crate::target::Target;

/// A specialized `Result` type for driver operations.
///
/// _Note:_ while it's typically parameterized as `DriverResult<T, Tgt>`, the
/// error value is in fact `Error<Tgt::Error>` (not `Tgt`).
pub type DriverResult<T, Tgt> = Result<T, Error<<Tgt as Target>::Error>>;

/// Erase state of a flash sector.
///
/// Drivers only track what they can cheaply know: a sector goes to `Yes`
/// when an erase of it completes, and back to `Unknown` whenever the bank is
/// re-probed. [`blank_check`] resolves the state by reading the sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erased {
    /// Nothing is known about the sector's contents.
    Unknown,
    /// The sector is in the erased state.
    Yes,
    /// The sector holds programmed data.
    No,
}

/// One sector of a flash bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    /// Byte offset of the sector from the bank base.
    pub offset: u32,
    /// Sector size in bytes.
    pub size: u32,
    /// Erase state, if known.
    pub erased: Erased,
    /// Write-protection state. Conservatively `true` after a probe; valid
    /// once [`FlashDriver::protect_check`] has run.
    pub protected: bool,
}

/// The operation set a flash bank driver exposes to the host's flash layer.
///
/// All operations that touch the controller require a halted target and
/// return [`Error::NotHalted`] otherwise. Sector ranges are inclusive on
/// both ends; passing an index outside the probed sector table is a caller
/// contract violation and panics.
pub trait FlashDriver<T: Target> {
    /// The driver's registry name (also its command-group prefix).
    fn name(&self) -> &'static str;

    /// Identify the connected part and build the bank's sector table,
    /// discarding any previous probe result.
    fn probe(&mut self, target: &mut T) -> DriverResult<(), T>;

    /// Probe only if the bank has not been successfully probed yet.
    fn auto_probe(&mut self, target: &mut T) -> DriverResult<(), T>;

    /// The bank's sector table. Empty until a successful probe.
    fn sectors(&self) -> &[Sector];

    /// Erase sectors `first..=last`.
    fn erase(&mut self, target: &mut T, first: usize, last: usize) -> DriverResult<(), T>;

    /// Set or clear write protection over sectors `first..=last`.
    fn protect(
        &mut self,
        target: &mut T,
        set: bool,
        first: usize,
        last: usize,
    ) -> DriverResult<(), T>;

    /// Refresh each sector's `protected` flag from the device.
    fn protect_check(&mut self, target: &mut T) -> DriverResult<(), T>;

    /// Program `data` starting `offset` bytes into the bank.
    fn write(&mut self, target: &mut T, data: &[u8], offset: u32) -> DriverResult<(), T>;

    /// Read `out.len()` bytes starting `offset` bytes into the bank.
    fn read(&mut self, target: &mut T, offset: u32, out: &mut [u8]) -> DriverResult<(), T>;

    /// Resolve every sector's erase state by inspecting its contents.
    fn erase_check(&mut self, target: &mut T) -> DriverResult<(), T>;

    /// A human-readable one-line description of the probed bank.
    fn info(&mut self, target: &mut T) -> DriverResult<String, T>;
}

/// Generic byte reader used by drivers whose flash is plain memory-mapped:
/// reads `out.len()` bytes from `address` using aligned word accesses.
pub fn read_flash<T: Target>(
    target: &mut T,
    address: u32,
    out: &mut [u8],
) -> Result<(), Error<T::Error>> {
    if out.is_empty() {
        return Ok(());
    }

    let end = address + out.len() as u32;
    let mut word_addr = address & !3;
    while word_addr < end {
        let word = target.read_u32(word_addr).map_err(Error::Transport)?;
        for (k, byte) in word.to_le_bytes().iter().enumerate() {
            let a = word_addr + k as u32;
            if a >= address && a < end {
                out[(a - address) as usize] = *byte;
            }
        }
        word_addr += 4;
    }
    Ok(())
}

/// Generic blank check: reads every sector and resolves its
/// [`Erased`] state. The erased pattern of NOR flash is all-ones.
pub fn blank_check<T: Target>(
    target: &mut T,
    base: u32,
    sectors: &mut [Sector],
) -> Result<(), Error<T::Error>> {
    for sector in sectors {
        let mut addr = base + sector.offset;
        let end = addr + sector.size;
        let mut blank = true;
        while addr < end {
            if target.read_u32(addr).map_err(Error::Transport)? != 0xFFFF_FFFF {
                blank = false;
                break;
            }
            addr += 4;
        }
        sector.erased = if blank { Erased::Yes } else { Erased::No };
    }
    Ok(())
}

impl fmt::Display for Erased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Erased::Unknown => f.write_str("unknown"),
            Erased::Yes => f.write_str("erased"),
            Erased::No => f.write_str("not erased"),
        }
    }
}
