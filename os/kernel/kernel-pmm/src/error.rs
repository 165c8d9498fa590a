use crate::addresses::{AddressError, PhysicalAddress};
use crate::config::ConfigError;

/// Errors reported by the page allocator.
///
/// [`OutOfMemory`](Self::OutOfMemory) and [`Halted`](Self::Halted) are fatal:
/// the kernel has no way to continue without the frame it asked for, and the
/// only valid handling is to stop the machine, see [`fail_stop`](crate::fail_stop).
/// Everything else is the immediate caller's problem.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageAllocError {
    #[error("page allocator is not initialized")]
    NotInitialized,
    #[error("page allocator is already initialized")]
    AlreadyInitialized,
    #[error("invalid page allocator configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("out of memory: every page frame is allocated")]
    OutOfMemory,
    #[error("page allocator halted after running out of memory")]
    Halted,
    #[error("invalid free of {address}: {reason}")]
    InvalidFree {
        address: PhysicalAddress,
        reason: InvalidFreeReason,
    },
}

impl PageAllocError {
    /// Whether the only valid response is halting the machine.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::Halted)
    }
}

/// Why a frame could not be returned to the allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFreeReason {
    #[error("address lies outside the managed region")]
    OutOfRange,
    #[error("address is not page aligned")]
    Misaligned,
    #[error("frame is reserved by the allocator")]
    Reserved,
    #[error("frame is already free")]
    AlreadyFree,
}

impl From<AddressError> for InvalidFreeReason {
    fn from(value: AddressError) -> Self {
        match value {
            AddressError::OutOfRange => Self::OutOfRange,
            AddressError::Misaligned => Self::Misaligned,
        }
    }
}
