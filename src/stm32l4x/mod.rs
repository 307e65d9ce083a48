//! The STM32L4 family flash bank driver.
//!
//! The L4 series carries a 64-bit wide flash IP with per-word ECC: words
//! cannot be programmed twice after an erase, and everything is keyed
//! behind a two-stage register lock. Larger parts split the flash into two
//! banks selected by a bit in the erase command; underpopulated dual-bank
//! devices leave a hole in the controller's sector numbering between the
//! banks. The reference manual for the STM32L476 is RM0351.
//!
//! The driver treats the whole device as one bank: the sector table spans
//! both hardware banks and the bank-selector bookkeeping stays internal.
//!
//! Probing reads the DBGMCU ID code and the factory flash-size halfword,
//! then derives the concrete layout from the option bits (see
//! [`geometry`]). Bulk writes stream through a small loader running on the
//! target CPU; everything else is direct register work over the debug link.

pub mod commands;
pub mod geometry;
pub mod options;
pub mod parts;
pub mod regs;

mod controller;
mod loader;

pub use geometry::ResolvedGeometry;
pub use options::{OptionBytes, WrpZone};
pub use parts::PartDescriptor;

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::driver::{DriverResult, Erased, FlashDriver, Sector};
use crate::error::Error;
use crate::stm32l4x::controller::Controller;
use crate::stm32l4x::loader::{LoaderParams, WRITE_LOADER};
use crate::stm32l4x::regs::{Cr, FlashReg, Optr, Sr, DBGMCU_IDCODE, RDP_NONE};
use crate::target::{AlgorithmError, FlashAlgorithm, Target, TargetState};

/// Erase can take as long as a second per sector; ten times that and the
/// part is toast.
const FLASH_ERASE_TIMEOUT: Duration = Duration::from_secs(10);

/// The driver's registry name and command-group prefix.
pub const DRIVER_NAME: &str = "stm32l4x";

/// One STM32L4 flash bank.
///
/// Create it when the host configures the bank, then [`probe`] (or let any
/// operation auto-probe) once a target is attached. The value owns all
/// per-bank state (probed geometry, sector table, decoded option bytes)
/// and borrows the host's [`Target`] for the duration of each operation.
///
/// [`probe`]: Stm32l4xFlash::probe
#[derive(Debug, Default)]
pub struct Stm32l4xFlash {
    idcode: u32,
    configured_size: Option<u32>,
    geometry: Option<ResolvedGeometry>,
    sectors: Vec<Sector>,
    options: OptionBytes,
}

fn require_halted<T: Target>(target: &mut T) -> Result<(), Error<T::Error>> {
    if target.state() != TargetState::Halted {
        error!("target not halted");
        return Err(Error::NotHalted);
    }
    Ok(())
}

impl Stm32l4xFlash {
    /// Create an unprobed bank that autodetects its flash size.
    pub fn new() -> Stm32l4xFlash {
        Stm32l4xFlash::default()
    }

    /// Create an unprobed bank with a host-configured size in bytes,
    /// overriding the device's flash-size register. This works around
    /// devices whose factory size word is invalid.
    pub fn with_configured_size(size_bytes: u32) -> Stm32l4xFlash {
        Stm32l4xFlash {
            configured_size: Some(size_bytes),
            ..Stm32l4xFlash::default()
        }
    }

    /// The raw ID-code register value captured by the last probe.
    pub fn idcode(&self) -> u32 {
        self.idcode
    }

    /// Whether the bank has been successfully probed.
    pub fn is_probed(&self) -> bool {
        self.geometry.is_some()
    }

    /// The probed bank layout.
    pub fn geometry(&self) -> Option<&ResolvedGeometry> {
        self.geometry.as_ref()
    }

    /// The bank's sector table. Empty until a successful probe.
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// The most recently read option bytes.
    pub fn options(&self) -> &OptionBytes {
        &self.options
    }

    /// Mutable access to the option bytes staged for the next
    /// [`write_options`](Stm32l4xFlash::write_options).
    pub fn options_mut(&mut self) -> &mut OptionBytes {
        &mut self.options
    }

    /// Identify the connected device and (re)build the bank's sector table.
    ///
    /// Reads the ID code, matches it against the part registry, reads the
    /// factory flash-size halfword (falling back to the registry maximum if
    /// it is unreadable or implausible), and applies the option bits that
    /// rearrange the banks. Afterwards every sector reports an unknown
    /// erase state and conservative protection until
    /// [`erase_check`](FlashDriver::erase_check) /
    /// [`protect_check`](Stm32l4xFlash::protect_check) refine them.
    pub fn probe<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        self.probe_inner(target).map(|_| ())
    }

    /// Probe only if no successful probe has happened yet.
    pub fn auto_probe<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        self.ensure_probed(target).map(|_| ())
    }

    fn ensure_probed<T: Target>(
        &mut self,
        target: &mut T,
    ) -> Result<ResolvedGeometry, Error<T::Error>> {
        match self.geometry {
            Some(geometry) => Ok(geometry),
            None => self.probe_inner(target),
        }
    }

    fn probe_inner<T: Target>(
        &mut self,
        target: &mut T,
    ) -> Result<ResolvedGeometry, Error<T::Error>> {
        self.geometry = None;
        self.sectors.clear();

        let idcode = target.read_u32(DBGMCU_IDCODE).map_err(Error::Transport)?;
        self.idcode = idcode;
        info!("device id = {idcode:#010x}");

        let part = match parts::lookup(idcode) {
            Some(part) => part,
            None => {
                warn!("cannot identify target as an STM32L4 family device");
                return Err(Error::UnsupportedPart { idcode });
            }
        };

        let flash_kb = match target.read_u16(part.fsize_addr) {
            Ok(kb) if kb != 0 && u32::from(kb) <= part.max_flash_kb => u32::from(kb),
            _ => {
                warn!(
                    "flash size probe failed or implausible, assuming {} KiB",
                    part.max_flash_kb
                );
                part.max_flash_kb
            }
        };

        let optr = if part.dual_bank {
            let bits = target
                .read_u32(part.regs_base + FlashReg::Optr.offset())
                .map_err(Error::Transport)?;
            Optr::from_bits_retain(bits)
        } else {
            Optr::empty()
        };

        info!(
            "flash size is {flash_kb} KiB, base address {:#010x}",
            regs::FLASH_BASE_ADDRESS
        );
        if let Some(bytes) = self.configured_size {
            info!(
                "ignoring probed flash size, using configured bank size: {} KiB",
                bytes / 1024
            );
        }

        let geometry = ResolvedGeometry::resolve(part, flash_kb, optr, self.configured_size);
        self.sectors = geometry.build_sectors();
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    /// Erase sectors `first..=last` (inclusive).
    ///
    /// On success the erased sectors are marked as such and the register
    /// lock is restored. If a sector erase fails, the driver returns
    /// immediately and the controller is deliberately left unlocked so the
    /// failure is observable; any follow-up operation (or an explicit
    /// `lock`) restores the lock.
    ///
    /// # Panics
    ///
    /// Panics if the range is not within the probed sector table.
    pub fn erase<T: Target>(
        &mut self,
        target: &mut T,
        first: usize,
        last: usize,
    ) -> Result<(), Error<T::Error>> {
        require_halted(target)?;
        let geometry = self.ensure_probed(target)?;
        assert!(
            first <= last && last < self.sectors.len(),
            "sector range {first}..={last} outside the bank"
        );

        let mut ctl = Controller::new(target, geometry.part.regs_base);
        ctl.unlock()?;

        // Per the reference manual: set PER and the sector number (BKER on
        // top for bank 2), set START, wait for BSY to clear.
        for i in first..=last {
            let command = geometry.erase_command(i);
            if let Err(e) = ctl.write_reg(FlashReg::Cr, command.bits()) {
                error!("erase of sector {i} failed, flash controller left unlocked");
                return Err(e);
            }
            if let Err(e) = ctl.wait_until_not_busy(FLASH_ERASE_TIMEOUT) {
                error!("erase of sector {i} failed, flash controller left unlocked");
                return Err(e);
            }
            self.sectors[i].erased = Erased::Yes;
        }

        if let Err(e) = ctl.lock() {
            error!("error restoring the flash lock");
            return Err(e);
        }
        Ok(())
    }

    /// Erase the whole device: MER1, plus MER2 on dual-bank parts, in one
    /// operation.
    pub fn mass_erase<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        require_halted(target)?;
        let geometry = self.ensure_probed(target)?;

        let mut ctl = Controller::new(target, geometry.part.regs_base);
        ctl.unlock()?;
        ctl.wait_until_not_busy(FLASH_ERASE_TIMEOUT / 10)?;

        let mut bits = Cr::from_bits_retain(ctl.read_reg(FlashReg::Cr)?) | Cr::MER1;
        if geometry.part.dual_bank {
            bits |= Cr::MER2;
        }
        ctl.write_reg(FlashReg::Cr, bits.bits())?;
        ctl.write_reg(FlashReg::Cr, (bits | Cr::START).bits())?;
        ctl.wait_until_not_busy(FLASH_ERASE_TIMEOUT)?;

        let cr = ctl.read_reg(FlashReg::Cr)?;
        ctl.write_reg(FlashReg::Cr, cr | Cr::LOCK.bits())
    }

    /// Program `data` starting `offset` bytes into the bank.
    ///
    /// `offset` must be 8-byte aligned ([`Error::Alignment`] otherwise).
    /// If `data` is not a multiple of 8 bytes, the tail flash word is
    /// padded with the erased pattern `0xFF` (with a warning): flash words
    /// are ECC secured, so the padding cannot be filled in by a later
    /// write anyway.
    ///
    /// Programming streams through the on-target loader. When no working
    /// area can be reserved the driver reports [`Error::NoWorkingArea`]
    /// with the lock restored, leaving any fallback strategy to the host.
    /// On a programming failure the controller is left unlocked, as with
    /// [`erase`](Stm32l4xFlash::erase).
    pub fn write<T: Target>(
        &mut self,
        target: &mut T,
        data: &[u8],
        offset: u32,
    ) -> Result<(), Error<T::Error>> {
        require_halted(target)?;
        let geometry = self.ensure_probed(target)?;

        if offset % 8 != 0 {
            error!("offset {offset:#x} breaks required 8-byte alignment");
            return Err(Error::Alignment { offset });
        }

        let padded: Option<Vec<u8>> = if data.len() % 8 != 0 {
            warn!("padding {} bytes to keep 8-byte write size", 8 - data.len() % 8);
            let mut copy = data.to_vec();
            copy.resize((data.len() + 7) & !7, 0xFF);
            Some(copy)
        } else {
            None
        };
        let data = padded.as_deref().unwrap_or(data);

        Controller::new(target, geometry.part.regs_base).unlock()?;

        match write_block(target, geometry, data, offset) {
            Ok(()) => {
                debug!("block write succeeded");
                Controller::new(target, geometry.part.regs_base).lock()
            }
            Err(Error::NoWorkingArea) => {
                // The loader never ran, so the controller state is clean;
                // relock and let the host pick a fallback.
                let _ = Controller::new(target, geometry.part.regs_base).lock();
                Err(Error::NoWorkingArea)
            }
            Err(e) => {
                warn!("block write failed, flash controller left unlocked");
                Err(e)
            }
        }
    }

    /// Set or clear write protection over sectors `first..=last`.
    ///
    /// The WRP encoding allows at most two zones per bank; this driver
    /// plans zone A of each affected bank and empties zone B, overwriting
    /// (not merging) whatever zones were configured before. Callers that
    /// need to preserve existing protection must read and merge it
    /// themselves. The new protection takes effect after a reset or power
    /// cycle.
    ///
    /// # Panics
    ///
    /// Panics if the range is not within the probed sector table.
    pub fn protect<T: Target>(
        &mut self,
        target: &mut T,
        set: bool,
        first: usize,
        last: usize,
    ) -> Result<(), Error<T::Error>> {
        require_halted(target)?;
        let geometry = self.ensure_probed(target)?;
        assert!(
            first <= last && last < self.sectors.len(),
            "sector range {first}..={last} outside the bank"
        );

        self.read_options(target)?;
        for sector in &mut self.sectors[first..=last] {
            sector.protected = set;
        }
        self.options
            .plan_protection(set, first as u32, last as u32, geometry.first_bank_sectors);
        self.write_options(target)
    }

    /// Refresh every sector's protection flag from the WRP zones currently
    /// programmed in the device.
    pub fn protect_check<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        let geometry = self.ensure_probed(target)?;
        self.read_options(target)?;

        let options = self.options;
        for (i, sector) in self.sectors.iter_mut().enumerate() {
            sector.protected = options.sector_protected(i as u32, geometry.first_bank_sectors);
        }
        Ok(())
    }

    /// Read OPTR and the WRP range registers into the bank's decoded
    /// [`OptionBytes`]. Notes at info level when readout protection is
    /// active.
    pub fn read_options<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        let geometry = self.ensure_probed(target)?;
        let mut ctl = Controller::new(target, geometry.part.regs_base);

        let optr = ctl.read_reg(FlashReg::Optr)?;
        self.options.decode_optr(optr);
        self.options.wrp1a = WrpZone::from_bits(ctl.read_reg(FlashReg::Wrp1Ar)?);
        self.options.wrp1b = WrpZone::from_bits(ctl.read_reg(FlashReg::Wrp1Br)?);
        if geometry.part.dual_bank {
            self.options.wrp2a = WrpZone::from_bits(ctl.read_reg(FlashReg::Wrp2Ar)?);
            self.options.wrp2b = WrpZone::from_bits(ctl.read_reg(FlashReg::Wrp2Br)?);
        }

        if self.options.rdp != RDP_NONE {
            info!("device readout protection is set (RDP = {:#04x})", self.options.rdp);
        }
        Ok(())
    }

    /// Program the staged [`OptionBytes`] into the device and run the
    /// option programming cycle.
    ///
    /// The new values only become active after the target is reset or
    /// power cycled; callers relaying user commands must say so.
    pub fn write_options<T: Target>(&mut self, target: &mut T) -> Result<(), Error<T::Error>> {
        let geometry = self.ensure_probed(target)?;
        let options = self.options;
        let mut ctl = Controller::new(target, geometry.part.regs_base);

        ctl.unlock()?;
        ctl.unlock_options()?;

        ctl.write_reg(FlashReg::Optr, options.encode_optr())?;
        ctl.write_reg(FlashReg::Wrp1Ar, options.wrp1a.to_bits())?;
        ctl.write_reg(FlashReg::Wrp1Br, options.wrp1b.to_bits())?;
        if geometry.part.dual_bank {
            ctl.write_reg(FlashReg::Wrp2Ar, options.wrp2a.to_bits())?;
            ctl.write_reg(FlashReg::Wrp2Br, options.wrp2b.to_bits())?;
        }

        ctl.write_reg(FlashReg::Cr, Cr::OPTSTRT.bits())?;
        ctl.wait_until_not_busy(FLASH_ERASE_TIMEOUT)?;

        // Restore both locks in the final CR write.
        ctl.write_reg(FlashReg::Cr, (Cr::OPTLOCK | Cr::LOCK).bits())
    }

    /// A one-line description of the probed part, with the silicon revision
    /// decoded from the top half of the ID code. Probes first if needed.
    pub fn info<T: Target>(&mut self, target: &mut T) -> Result<String, Error<T::Error>> {
        let geometry = self.ensure_probed(target)?;
        let rev = (self.idcode >> 16) as u16;
        Ok(match geometry.part.revision_str(rev) {
            Some(rev) => format!("{} - Rev: {}", geometry.part.name, rev),
            None => format!("{} - Rev: unknown ({:#06x})", geometry.part.name, rev),
        })
    }
}

/// Stream `data` through the on-target loader.
fn write_block<T: Target>(
    target: &mut T,
    geometry: ResolvedGeometry,
    data: &[u8],
    offset: u32,
) -> Result<(), Error<T::Error>> {
    let word_count = (data.len() / 8) as u32;

    let algo_area = match target.alloc_working_area(WRITE_LOADER.len() as u32) {
        Some(area) => area,
        None => {
            warn!("no working area available, can't do block memory writes");
            return Err(Error::NoWorkingArea);
        }
    };
    if let Err(e) = target.write_buffer(algo_area.address, WRITE_LOADER) {
        target.free_working_area(algo_area);
        return Err(Error::Transport(e));
    }

    // Scratch ring: start big, halve until the allocator cooperates.
    let mut ring_size: u32 = 16 * 1024;
    let ring = loop {
        match target.try_alloc_working_area(ring_size) {
            Some(area) => break area,
            None => {
                ring_size /= 2;
                if ring_size <= 256 {
                    // The loader is already uploaded but there is nowhere
                    // to stream; free it again.
                    target.free_working_area(algo_area);
                    warn!("no large enough working area available, can't do block memory writes");
                    return Err(Error::NoWorkingArea);
                }
            }
        }
    };

    let mut regs = LoaderParams {
        ring_start: ring.address,
        ring_end: ring.address + ring.size,
        flash_address: geometry.base + offset,
        word_count,
        regs_base: geometry.part.regs_base,
    }
    .to_regs();

    let outcome = {
        let algorithm = FlashAlgorithm {
            payload: data,
            block_size: 8,
            block_count: word_count,
            ring: &ring,
            entry: algo_area.address,
        };
        match target.run_flash_algorithm(&algorithm, &mut regs) {
            Ok(()) => Ok(()),
            Err(AlgorithmError::Transport(e)) => Err(Error::Transport(e)),
            Err(AlgorithmError::FlashOpFailed) => {
                info!("error executing stm32l4x flash write algorithm");
                // The loader reports the SR it saw in its r0 slot.
                let bits = regs[0] & Sr::ERRORS.bits();
                if bits != 0 {
                    error!("flash write failed (SR = {bits:#010x})");
                    // Clear but report.
                    let _ = target
                        .write_u32(geometry.part.regs_base + FlashReg::Sr.offset(), bits);
                }
                if bits & Sr::WRPERR.bits() != 0 {
                    error!("flash memory write protected");
                    Err(Error::WriteProtected)
                } else {
                    Err(Error::Controller { bits })
                }
            }
        }
    };

    target.free_working_area(ring);
    target.free_working_area(algo_area);
    outcome
}

impl<T: Target> FlashDriver<T> for Stm32l4xFlash {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn probe(&mut self, target: &mut T) -> DriverResult<(), T> {
        Stm32l4xFlash::probe(self, target)
    }

    fn auto_probe(&mut self, target: &mut T) -> DriverResult<(), T> {
        Stm32l4xFlash::auto_probe(self, target)
    }

    fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    fn erase(&mut self, target: &mut T, first: usize, last: usize) -> DriverResult<(), T> {
        Stm32l4xFlash::erase(self, target, first, last)
    }

    fn protect(
        &mut self,
        target: &mut T,
        set: bool,
        first: usize,
        last: usize,
    ) -> DriverResult<(), T> {
        Stm32l4xFlash::protect(self, target, set, first, last)
    }

    fn protect_check(&mut self, target: &mut T) -> DriverResult<(), T> {
        Stm32l4xFlash::protect_check(self, target)
    }

    fn write(&mut self, target: &mut T, data: &[u8], offset: u32) -> DriverResult<(), T> {
        Stm32l4xFlash::write(self, target, data, offset)
    }

    fn read(&mut self, target: &mut T, offset: u32, out: &mut [u8]) -> DriverResult<(), T> {
        let geometry = self.ensure_probed(target)?;
        crate::driver::read_flash(target, geometry.base + offset, out)
    }

    fn erase_check(&mut self, target: &mut T) -> DriverResult<(), T> {
        let geometry = self.ensure_probed(target)?;
        crate::driver::blank_check(target, geometry.base, &mut self.sectors)
    }

    fn info(&mut self, target: &mut T) -> DriverResult<String, T> {
        Stm32l4xFlash::info(self, target)
    }
}
