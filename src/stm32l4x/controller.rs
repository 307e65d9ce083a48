//! Register-level access to the flash controller of one bank.
//!
//! [`Controller`] is a short-lived view over the borrowed target: it knows
//! the controller's register base, performs the status polling and error
//! latching discipline, and runs the two-key unlock sequences. Callers
//! create one per operation step and let it go once the registers are back
//! in a quiescent state.

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::error::{Error, Lock};
use crate::stm32l4x::regs::{FlashReg, Cr, Sr, KEY1, KEY2, OPTKEY1, OPTKEY2};
use crate::target::Target;

pub(crate) struct Controller<'a, T: Target> {
    target: &'a mut T,
    base: u32,
}

impl<'a, T: Target> Controller<'a, T> {
    pub(crate) fn new(target: &'a mut T, base: u32) -> Self {
        Controller { target, base }
    }

    pub(crate) fn read_reg(&mut self, reg: FlashReg) -> Result<u32, Error<T::Error>> {
        self.target
            .read_u32(self.base + reg.offset())
            .map_err(Error::Transport)
    }

    pub(crate) fn write_reg(&mut self, reg: FlashReg, value: u32) -> Result<(), Error<T::Error>> {
        self.target
            .write_u32(self.base + reg.offset(), value)
            .map_err(Error::Transport)
    }

    /// Poll SR until BSY clears or the deadline passes, then latch-and-clear
    /// any error bits the operation left behind.
    ///
    /// The caller must have issued the operation-starting CR write before
    /// calling this. Error bits are written back to SR (write-one-to-clear)
    /// even when reporting failure, so the next operation starts clean.
    pub(crate) fn wait_until_not_busy(
        &mut self,
        timeout: Duration,
    ) -> Result<(), Error<T::Error>> {
        let deadline = Instant::now() + timeout;
        let status = loop {
            let status = self.read_reg(FlashReg::Sr)?;
            if status & Sr::BSY.bits() == 0 {
                break status;
            }
            if Instant::now() >= deadline {
                warn!("timed out waiting for flash BSY to clear (SR = {status:#010x})");
                return Err(Error::Timeout);
            }
            thread::sleep(Duration::from_millis(1));
        };

        let errors = Sr::from_bits_retain(status) & Sr::ERRORS;
        if !errors.is_empty() {
            // Clear but report. If the clearing write itself fails we still
            // report the controller error, not the transport hiccup.
            let _ = self.write_reg(FlashReg::Sr, errors.bits());
            if errors.contains(Sr::WRPERR) {
                info!("operation hit write-protected flash (SR = {:#010x})", errors.bits());
                return Err(Error::WriteProtected);
            }
            return Err(Error::Controller { bits: errors.bits() });
        }
        Ok(())
    }

    /// Drop the main register lock. No-op when already unlocked; the two
    /// key writes must be adjacent, the controller aborts the sequence on
    /// any intervening register write.
    pub(crate) fn unlock(&mut self) -> Result<(), Error<T::Error>> {
        let cr = self.read_reg(FlashReg::Cr)?;
        if cr & Cr::LOCK.bits() == 0 {
            return Ok(());
        }

        self.write_reg(FlashReg::Keyr, KEY1)?;
        self.write_reg(FlashReg::Keyr, KEY2)?;

        let cr = self.read_reg(FlashReg::Cr)?;
        if cr & Cr::LOCK.bits() != 0 {
            error!("flash not unlocked, CR = {cr:#010x}");
            return Err(Error::UnlockFailed {
                which: Lock::Registers,
                cr,
            });
        }
        Ok(())
    }

    /// Drop the option register lock; analogous to [`unlock`](Self::unlock).
    pub(crate) fn unlock_options(&mut self) -> Result<(), Error<T::Error>> {
        let cr = self.read_reg(FlashReg::Cr)?;
        if cr & Cr::OPTLOCK.bits() == 0 {
            return Ok(());
        }

        self.write_reg(FlashReg::OptKeyr, OPTKEY1)?;
        self.write_reg(FlashReg::OptKeyr, OPTKEY2)?;

        let cr = self.read_reg(FlashReg::Cr)?;
        if cr & Cr::OPTLOCK.bits() != 0 {
            error!("options not unlocked, CR = {cr:#010x}");
            return Err(Error::UnlockFailed {
                which: Lock::OptionBytes,
                cr,
            });
        }
        Ok(())
    }

    /// Restore the main register lock.
    pub(crate) fn lock(&mut self) -> Result<(), Error<T::Error>> {
        self.write_reg(FlashReg::Cr, Cr::LOCK.bits())
    }
}
