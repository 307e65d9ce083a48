//! An ergonomic, trait-based library of NOR flash bank drivers for host-side
//! debug and programming tools.
//!
//! `flashbank` sits between a host debugging framework and a target
//! microcontroller's on-chip flash controller. The host side provides a
//! [`Target`](target::Target) implementation: raw memory access over the
//! debug link (SWD/JTAG), target state queries, working-area allocation, and
//! an asynchronous flash-algorithm runner. On top of that interface, each
//! family driver in this crate implements the register-level programming
//! protocol for its flash controller: unlock key sequences, sector erase,
//! option-byte management, write protection, and streamed 64-bit word
//! programming through a small loader executing on the target CPU.
//!
//! Drivers expose a uniform operation set through the
//! [`FlashDriver`](driver::FlashDriver) trait, which the host's flash layer
//! dispatches through, plus a family-specific command group for the odd
//! device-level knobs (readout protection, watchdog option bits, mass erase).
//!
//! ## Supported families
//!
//! - [`stm32l4x`]: the STM32L4 series (dual-bank, 64-bit flash words with
//!   ECC, WRP zone protection).
//!
//! ## Example
//!
//! ```rust,ignore
//! use flashbank::driver::FlashDriver;
//! use flashbank::stm32l4x::Stm32l4xFlash;
//!
//! let mut bank = Stm32l4xFlash::new();
//! bank.probe(&mut probe)?;
//! bank.erase(&mut probe, 0, 7)?;
//! bank.write(&mut probe, &firmware, 0)?;
//! ```
//!
//! ## Logging
//!
//! This crate logs through the [`log`] facade. The host application decides
//! whether (and how) to install a logger.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod stm32l4x;
pub mod target;

mod error;

pub use error::{Error, Lock};
