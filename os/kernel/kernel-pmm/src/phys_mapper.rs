//! # Reaching Physical Memory
//!
//! The allocator has to write to the memory it manages: its bitmap lives at
//! the base of the region, and frames are zero-filled on request. Code can only
//! dereference addresses in the current address space, so every such access
//! goes through a [`PhysMapper`].
//!
//! [`DirectMap`] covers the two layouts a kernel typically uses:
//! - **Identity**: physical memory is mapped 1:1 (`offset == 0`), as during
//!   early boot.
//! - **Direct map**: all of physical memory is mapped at a fixed offset
//!   (a higher-half direct map), so `ptr = offset + pa`.
//!
//! Host-side tests use the same offset scheme to point the managed region
//! into an ordinary buffer, see [`DirectMap::for_buffer`].

use crate::addresses::PhysicalAddress;
use core::ptr;

/// Converts physical addresses to pointers usable in the current address space.
pub trait PhysMapper {
    /// # Safety
    /// The caller must ensure `pa` is mapped (and writable, if the pointer is
    /// written through) for as long as the pointer is used.
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;
}

/// [`PhysMapper`] for memory mapped at a constant offset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DirectMap {
    offset: u64,
}

impl DirectMap {
    /// Physical addresses are usable as-is.
    pub const IDENTITY: Self = Self { offset: 0 };

    /// Physical address `pa` is visible at `offset + pa`.
    #[must_use]
    pub const fn with_offset(offset: u64) -> Self {
        Self { offset }
    }

    /// Makes `base` resolve to `buffer`, so physical addresses starting at
    /// `base` land inside the buffer.
    #[must_use]
    pub fn for_buffer<T>(base: PhysicalAddress, buffer: *mut T) -> Self {
        let host = buffer.expose_provenance() as u64;
        Self::with_offset(host.wrapping_sub(base.as_u64()))
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for DirectMap {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        ptr::with_exposed_provenance_mut(pa.as_u64().wrapping_add(self.offset) as usize)
    }
}
