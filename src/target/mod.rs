//! The interface a host debugging framework implements so that flash drivers
//! can reach the target.
//!
//! The [`Target`] trait is the primary bridge between this crate's generic
//! driver code and the host's project-specific debug transport. Everything a
//! driver does (register pokes, status polls, loader upload, streamed
//! programming) goes through these operations.
//!
//! ## Error handling
//!
//! Every fallible operation returns the implementor's own error type
//! ([`Target::Error`]). Drivers never interpret it; they wrap it in
//! [`Error::Transport`](crate::Error::Transport) and pass it up unchanged,
//! so the host can always recover the concrete failure.
//!
//! ## Concurrency
//!
//! Drivers borrow the target mutably for the duration of each operation and
//! perform no internal locking. Serialising access to the debug link across
//! the rest of the host framework is the host's job.

pub mod algorithm;

pub use algorithm::{AlgorithmError, FlashAlgorithm};

/// Execution state of the target CPU, as reported by the debug transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The core is halted under debugger control.
    Halted,
    /// The core is executing.
    Running,
    /// The core is held in reset.
    Reset,
    /// The transport could not determine the core's state.
    Unknown,
}

/// A block of target RAM temporarily reserved for the host's use.
///
/// Working areas are handed out by the target's allocator and must be
/// returned through [`Target::free_working_area`]. Drivers release every
/// area they hold on all exit paths, including failures.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkingArea {
    /// Start of the area in target address space.
    pub address: u32,
    /// Size of the area in bytes.
    pub size: u32,
}

/// The set of operations a flash driver needs from the host's target
/// abstraction.
///
/// Memory accessors operate on raw target addresses; the driver computes
/// controller-register addresses itself. Implementations should perform the
/// access at the requested width; flash controller registers are picky
/// about it.
pub trait Target {
    /// The transport-level error produced when a debug-link operation fails.
    type Error;

    /// Report the execution state of the target CPU.
    fn state(&mut self) -> TargetState;

    /// Read a halfword from the target.
    fn read_u16(&mut self, addr: u32) -> Result<u16, Self::Error>;

    /// Read a word from the target.
    fn read_u32(&mut self, addr: u32) -> Result<u32, Self::Error>;

    /// Write a word to the target.
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), Self::Error>;

    /// Write a byte buffer to target RAM.
    fn write_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Try to reserve `size` bytes of target RAM, returning `None` if the
    /// allocator cannot satisfy the request.
    fn try_alloc_working_area(&mut self, size: u32) -> Option<WorkingArea>;

    /// Reserve `size` bytes of target RAM.
    ///
    /// Identical to [`try_alloc_working_area`](Self::try_alloc_working_area);
    /// hosts that track "expected to succeed" allocations separately (e.g.
    /// for diagnostics) can override this.
    fn alloc_working_area(&mut self, size: u32) -> Option<WorkingArea> {
        self.try_alloc_working_area(size)
    }

    /// Return a previously reserved working area to the allocator.
    fn free_working_area(&mut self, area: WorkingArea);

    /// Run a flash-loader algorithm on the target while streaming its
    /// payload into a FIFO ring, blocking until the loader halts.
    ///
    /// `regs` holds the CPU register values (`r0..`) the loader reads on
    /// entry; on return the slots are updated with the final register
    /// values, which loaders use to report an outcome word. See
    /// [`algorithm`] for the FIFO conventions.
    fn run_flash_algorithm(
        &mut self,
        algorithm: &FlashAlgorithm<'_>,
        regs: &mut [u32],
    ) -> Result<(), AlgorithmError<Self::Error>>;
}

macro_rules! impl_dyn_target {
    ($type:ty) => {
        impl<E> Target for $type {
            type Error = E;

            fn state(&mut self) -> TargetState {
                (**self).state()
            }

            fn read_u16(&mut self, addr: u32) -> Result<u16, Self::Error> {
                (**self).read_u16(addr)
            }

            fn read_u32(&mut self, addr: u32) -> Result<u32, Self::Error> {
                (**self).read_u32(addr)
            }

            fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), Self::Error> {
                (**self).write_u32(addr, value)
            }

            fn write_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
                (**self).write_buffer(addr, data)
            }

            fn try_alloc_working_area(&mut self, size: u32) -> Option<WorkingArea> {
                (**self).try_alloc_working_area(size)
            }

            fn alloc_working_area(&mut self, size: u32) -> Option<WorkingArea> {
                (**self).alloc_working_area(size)
            }

            fn free_working_area(&mut self, area: WorkingArea) {
                (**self).free_working_area(area)
            }

            fn run_flash_algorithm(
                &mut self,
                algorithm: &FlashAlgorithm<'_>,
                regs: &mut [u32],
            ) -> Result<(), AlgorithmError<Self::Error>> {
                (**self).run_flash_algorithm(algorithm, regs)
            }
        }
    };
}

impl_dyn_target!(&mut dyn Target<Error = E>);
impl_dyn_target!(Box<dyn Target<Error = E>>);
