use core::fmt::{self, Debug, Display};

/// Which lock a failed unlock sequence was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// The main flash-register lock (`CR.LOCK`).
    Registers,
    /// The option-register lock (`CR.OPTLOCK`).
    OptionBytes,
}

/// An error which may occur while driving a flash bank.
///
/// The type parameter `E` is the transport error of the host's
/// [`Target`](crate::target::Target) implementation. Transport failures are
/// propagated through the driver unchanged, so the host can recover its own
/// error value from [`Error::Transport`].
///
/// Whenever a driver returns an error, any error bits the flash controller
/// latched during the failed operation have already been cleared
/// (write-one-to-clear), so the next operation starts from a clean status
/// register.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<E> {
    /// The underlying debug-link read or write failed.
    Transport(E),
    /// The operation requires a halted target, but the target is running (or
    /// in an unknown state).
    NotHalted,
    /// The controller's BSY flag failed to clear within the operation's
    /// deadline.
    Timeout,
    /// A two-key unlock sequence did not clear the lock bit.
    UnlockFailed {
        /// The lock that stayed set.
        which: Lock,
        /// The control register value read back after the key writes.
        cr: u32,
    },
    /// A write offset breaks the controller's 8-byte flash-word alignment.
    Alignment {
        /// The offending byte offset into the bank.
        offset: u32,
    },
    /// The probed device ID is not in the part registry.
    UnsupportedPart {
        /// The raw ID-code register value.
        idcode: u32,
    },
    /// The target-side working-area allocator refused a scratch allocation,
    /// so the accelerated block write cannot run.
    NoWorkingArea,
    /// The controller latched WRPERR: the operation touched write-protected
    /// sectors.
    WriteProtected,
    /// The controller latched error bits other than WRPERR.
    Controller {
        /// The latched (and since cleared) SR error bits.
        bits: u32,
    },
    /// A command line did not match the command's usage.
    Syntax {
        /// The usage string of the command that rejected its arguments.
        usage: &'static str,
    },
}

impl<E> Error<E> {
    /// Check whether the error was a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// If the error was a transport failure, return the host's error value.
    pub fn into_transport(self) -> Option<E> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "debug link error: {}", e),
            Error::NotHalted => write!(f, "target not halted"),
            Error::Timeout => write!(f, "timed out waiting for flash controller to go idle"),
            Error::UnlockFailed { which: Lock::Registers, cr } => {
                write!(f, "flash registers stayed locked (CR = {:#010x})", cr)
            }
            Error::UnlockFailed { which: Lock::OptionBytes, cr } => {
                write!(f, "option registers stayed locked (CR = {:#010x})", cr)
            }
            Error::Alignment { offset } => {
                write!(f, "offset {:#x} breaks required 8-byte alignment", offset)
            }
            Error::UnsupportedPart { idcode } => {
                write!(f, "unsupported part (ID code {:#010x})", idcode)
            }
            Error::NoWorkingArea => write!(f, "no target working area available"),
            Error::WriteProtected => write!(f, "flash memory is write protected"),
            Error::Controller { bits } => {
                write!(f, "flash controller error (SR = {:#010x})", bits)
            }
            Error::Syntax { usage } => write!(f, "usage: {}", usage),
        }
    }
}

impl<E: Debug + Display> std::error::Error for Error<E> {}
