//! The `stm32l4x` command group.
//!
//! These are the device-level knobs the host's scripting layer exposes
//! beside the generic flash operations: readout protection, mass erase and
//! the watchdog option bits. The host resolves the bank argument itself and
//! hands the remaining arguments here; [`Command::parse`] validates them
//! and [`Command::run`] executes against a bank and target, appending any
//! human-readable output to the caller's buffer.
//!
//! All commands require a halted target. Option-byte changes only take
//! effect after the target is reset or power cycled; the commands that
//! change them say so in their output.

use core::fmt::Write as _;

use log::debug;

use crate::driver::Erased;
use crate::error::Error;
use crate::stm32l4x::regs::RDP_NONE;
use crate::stm32l4x::{require_halted, Stm32l4xFlash, DRIVER_NAME};
use crate::target::Target;

/// A parsed `stm32l4x` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `stm32l4x lock <bank>`: enable readout protection (Level 1).
    Lock,
    /// `stm32l4x unlock <bank>`: clear readout protection, forcing a device
    /// unlock if it was set.
    Unlock,
    /// `stm32l4x mass_erase <bank>`: erase the whole device.
    MassErase,
    /// `stm32l4x window_watchdog_soft_selection <bank> enable|disable`.
    WindowWatchdogSoftSelection(bool),
    /// `stm32l4x independent_watchdog_standby <bank> enable|disable`.
    IndependentWatchdogStandby(bool),
    /// `stm32l4x independent_watchdog_stop <bank> enable|disable`.
    IndependentWatchdogStop(bool),
    /// `stm32l4x independent_watchdog_soft_selection <bank> enable|disable`.
    IndependentWatchdogSoftSelection(bool),
}

fn parse_enable<E>(arg: &str, usage: &'static str) -> Result<bool, Error<E>> {
    match arg {
        "enable" => Ok(true),
        "disable" => Ok(false),
        _ => Err(Error::Syntax { usage }),
    }
}

impl Command {
    /// Parse a command of the `stm32l4x` group. `argv` starts with the bank
    /// argument (resolved by the host; only its presence is checked here).
    pub fn parse<E>(name: &str, argv: &[&str]) -> Result<Command, Error<E>> {
        match name {
            "lock" => match argv {
                [_bank] => Ok(Command::Lock),
                _ => Err(Error::Syntax {
                    usage: "stm32l4x lock <bank>",
                }),
            },
            "unlock" => match argv {
                [_bank] => Ok(Command::Unlock),
                _ => Err(Error::Syntax {
                    usage: "stm32l4x unlock <bank>",
                }),
            },
            "mass_erase" => match argv {
                [_bank] => Ok(Command::MassErase),
                _ => Err(Error::Syntax {
                    usage: "stm32l4x mass_erase <bank>",
                }),
            },
            "window_watchdog_soft_selection" => {
                const USAGE: &str = "stm32l4x window_watchdog_soft_selection <bank> enable|disable";
                match argv {
                    [_bank, arg] => Ok(Command::WindowWatchdogSoftSelection(parse_enable(arg, USAGE)?)),
                    _ => Err(Error::Syntax { usage: USAGE }),
                }
            }
            "independent_watchdog_standby" => {
                const USAGE: &str = "stm32l4x independent_watchdog_standby <bank> enable|disable";
                match argv {
                    [_bank, arg] => Ok(Command::IndependentWatchdogStandby(parse_enable(arg, USAGE)?)),
                    _ => Err(Error::Syntax { usage: USAGE }),
                }
            }
            "independent_watchdog_stop" => {
                const USAGE: &str = "stm32l4x independent_watchdog_stop <bank> enable|disable";
                match argv {
                    [_bank, arg] => Ok(Command::IndependentWatchdogStop(parse_enable(arg, USAGE)?)),
                    _ => Err(Error::Syntax { usage: USAGE }),
                }
            }
            "independent_watchdog_soft_selection" => {
                const USAGE: &str =
                    "stm32l4x independent_watchdog_soft_selection <bank> enable|disable";
                match argv {
                    [_bank, arg] => {
                        Ok(Command::IndependentWatchdogSoftSelection(parse_enable(arg, USAGE)?))
                    }
                    _ => Err(Error::Syntax { usage: USAGE }),
                }
            }
            _ => Err(Error::Syntax {
                usage: "stm32l4x lock|unlock|mass_erase|window_watchdog_soft_selection|independent_watchdog_standby|independent_watchdog_stop|independent_watchdog_soft_selection",
            }),
        }
    }

    /// Execute the command against a bank and target, appending output to
    /// `out`.
    pub fn run<T: Target>(
        self,
        flash: &mut Stm32l4xFlash,
        target: &mut T,
        out: &mut String,
    ) -> Result<(), Error<T::Error>> {
        require_halted(target)?;

        match self {
            Command::Lock => {
                flash.read_options(target)?;
                // Any nonzero RDP byte other than 0xAA raises to Level 1.
                // Never 0xCC: Level 2 is irreversible.
                flash.options_mut().rdp = 0x00;
                flash.write_options(target)?;
                let _ = writeln!(out, "{DRIVER_NAME} locked");
                let _ = writeln!(
                    out,
                    "INFO: a reset or power cycle is required for the new settings to take effect."
                );
                Ok(())
            }
            Command::Unlock => {
                flash.read_options(target)?;
                // Clearing RDP also forces a device unlock (and a mass
                // erase by the device) if protection was set.
                flash.options_mut().rdp = RDP_NONE;
                flash.write_options(target)?;
                let _ = writeln!(out, "{DRIVER_NAME} unlocked.");
                let _ = writeln!(
                    out,
                    "INFO: a reset or power cycle is required for the new settings to take effect."
                );
                Ok(())
            }
            Command::MassErase => match flash.mass_erase(target) {
                Ok(()) => {
                    for sector in &mut flash.sectors {
                        sector.erased = Erased::Yes;
                    }
                    let _ = writeln!(out, "{DRIVER_NAME} mass erase complete");
                    Ok(())
                }
                Err(e) => {
                    let _ = writeln!(out, "{DRIVER_NAME} mass erase failed");
                    Err(e)
                }
            },
            Command::WindowWatchdogSoftSelection(enable) => {
                self.toggle_option(flash, target, out, |flash| {
                    flash.options_mut().window_watchdog_soft_selection = enable;
                })
            }
            Command::IndependentWatchdogStandby(enable) => {
                self.toggle_option(flash, target, out, |flash| {
                    flash.options_mut().independent_watchdog_standby = enable;
                })
            }
            Command::IndependentWatchdogStop(enable) => {
                self.toggle_option(flash, target, out, |flash| {
                    flash.options_mut().independent_watchdog_stop = enable;
                })
            }
            Command::IndependentWatchdogSoftSelection(enable) => {
                self.toggle_option(flash, target, out, |flash| {
                    flash.options_mut().independent_watchdog_soft_selection = enable;
                })
            }
        }
    }

    fn toggle_option<T: Target>(
        self,
        flash: &mut Stm32l4xFlash,
        target: &mut T,
        out: &mut String,
        apply: impl FnOnce(&mut Stm32l4xFlash),
    ) -> Result<(), Error<T::Error>> {
        debug!("updating option bytes for {self:?}");
        flash.read_options(target)?;
        apply(flash);
        flash.write_options(target)?;
        let _ = writeln!(
            out,
            "INFO: a reset or power cycle is required for the new settings to take effect."
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_whole_group() {
        assert_eq!(Command::parse::<()>("lock", &["0"]), Ok(Command::Lock));
        assert_eq!(Command::parse::<()>("unlock", &["0"]), Ok(Command::Unlock));
        assert_eq!(Command::parse::<()>("mass_erase", &["0"]), Ok(Command::MassErase));
        assert_eq!(
            Command::parse::<()>("independent_watchdog_stop", &["0", "enable"]),
            Ok(Command::IndependentWatchdogStop(true))
        );
        assert_eq!(
            Command::parse::<()>("window_watchdog_soft_selection", &["0", "disable"]),
            Ok(Command::WindowWatchdogSoftSelection(false))
        );
    }

    #[test]
    fn rejects_bad_arity_and_arguments() {
        assert!(matches!(
            Command::parse::<()>("lock", &[]),
            Err(Error::Syntax { .. })
        ));
        assert!(matches!(
            Command::parse::<()>("independent_watchdog_standby", &["0"]),
            Err(Error::Syntax { .. })
        ));
        assert!(matches!(
            Command::parse::<()>("independent_watchdog_standby", &["0", "on"]),
            Err(Error::Syntax { .. })
        ));
        assert!(matches!(
            Command::parse::<()>("frobnicate", &["0"]),
            Err(Error::Syntax { .. })
        ));
    }
}
