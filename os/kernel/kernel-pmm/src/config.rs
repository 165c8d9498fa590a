//! Boot-time configuration of the page allocator and the bitmap geometry
//! derived from it.

use crate::addresses::{ManagedRegion, PhysicalAddress};
use crate::freemap::Freemap;
use kernel_info::memory::{MAIN_MEMORY_START, MEGA, PAGE_SIZE};

/// Default for [`PageAllocConfig::reserve_page_zero`], selected by the
/// `reserve-page-zero` cargo feature.
pub const RESERVE_PAGE_ZERO_DEFAULT: bool = cfg!(feature = "reserve-page-zero");

#[allow(clippy::cast_possible_truncation)]
const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// What the boot sequence tells the allocator about physical memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageAllocConfig {
    total_memory_bytes: u64,
    base_address: PhysicalAddress,
    reserve_page_zero: bool,
}

impl PageAllocConfig {
    #[must_use]
    pub const fn new(total_memory_bytes: u64, base_address: u64) -> Self {
        Self {
            total_memory_bytes,
            base_address: PhysicalAddress::new(base_address),
            reserve_page_zero: RESERVE_PAGE_ZERO_DEFAULT,
        }
    }

    /// Memory size as reported by the firmware, in megabytes.
    ///
    /// # Errors
    /// [`ConfigError::SizeOverflow`] if the size does not fit a 64-bit byte
    /// count.
    pub const fn from_megabytes(
        total_memory_megabytes: u64,
        base_address: u64,
    ) -> Result<Self, ConfigError> {
        match total_memory_megabytes.checked_mul(MEGA) {
            Some(bytes) => Ok(Self::new(bytes, base_address)),
            None => Err(ConfigError::SizeOverflow {
                total_memory_megabytes,
            }),
        }
    }

    /// Everything from [`MAIN_MEMORY_START`] up to `total_memory_megabytes`.
    ///
    /// # Errors
    /// See [`from_megabytes`](Self::from_megabytes).
    pub const fn main_memory(total_memory_megabytes: u64) -> Result<Self, ConfigError> {
        Self::from_megabytes(total_memory_megabytes, MAIN_MEMORY_START)
    }

    /// Keep page number 0 permanently allocated.
    ///
    /// This is a compatibility workaround: at least one virtualization
    /// environment does not tolerate the frame right at the start of main
    /// memory being used; the reason is unknown. With the bitmap at the start
    /// of the region, page 0 is normally already taken by the bitmap itself.
    #[must_use]
    pub const fn with_page_zero_reservation(mut self, reserve: bool) -> Self {
        self.reserve_page_zero = reserve;
        self
    }

    #[must_use]
    pub const fn total_memory_bytes(&self) -> u64 {
        self.total_memory_bytes
    }

    #[must_use]
    pub const fn base_address(&self) -> PhysicalAddress {
        self.base_address
    }

    #[must_use]
    pub const fn reserve_page_zero(&self) -> bool {
        self.reserve_page_zero
    }

    /// Computes the managed region and the bitmap geometry.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the base is not page aligned or the
    /// region is empty, too large to index, or too small to hold its own
    /// bitmap plus one usable frame.
    pub fn layout(&self) -> Result<FreemapLayout, ConfigError> {
        let base = self.base_address;
        if !base.is_page_aligned() {
            return Err(ConfigError::MisalignedBase(base));
        }

        let managed_bytes = self
            .total_memory_bytes
            .checked_sub(base.as_u64())
            .filter(|&bytes| bytes > 0)
            .ok_or(ConfigError::NoManagedMemory {
                total_memory_bytes: self.total_memory_bytes,
                base_address: base,
            })?;

        let pages_total = usize::try_from(managed_bytes / PAGE_SIZE)
            .map_err(|_| ConfigError::TooLarge { managed_bytes })?;
        let freemap_bytes = pages_total.div_ceil(8);
        let freemap_cells = Freemap::cells_for(pages_total);
        let freemap_pages = freemap_bytes.div_ceil(PAGE_BYTES);

        if pages_total <= freemap_pages {
            return Err(ConfigError::TooSmall {
                pages_total,
                freemap_pages,
            });
        }

        Ok(FreemapLayout {
            region: ManagedRegion::new(base, pages_total),
            freemap_bytes,
            freemap_cells,
            freemap_pages,
        })
    }
}

/// Geometry of the managed region and of the bitmap stored at its start.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FreemapLayout {
    region: ManagedRegion,
    freemap_bytes: usize,
    freemap_cells: usize,
    freemap_pages: usize,
}

impl FreemapLayout {
    #[must_use]
    pub const fn region(&self) -> ManagedRegion {
        self.region
    }

    #[must_use]
    pub const fn pages_total(&self) -> usize {
        self.region.pages_total()
    }

    /// `ceil(pages_total / 8)`
    #[must_use]
    pub const fn freemap_bytes(&self) -> usize {
        self.freemap_bytes
    }

    /// `ceil(pages_total / CELL_BITS)`
    #[must_use]
    pub const fn freemap_cells(&self) -> usize {
        self.freemap_cells
    }

    /// `ceil(freemap_bytes / PAGE_SIZE)`; frames consumed by the bitmap itself.
    #[must_use]
    pub const fn freemap_pages(&self) -> usize {
        self.freemap_pages
    }
}

/// Rejected allocator configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("total memory of {total_memory_bytes} bytes does not extend past base address {base_address}")]
    NoManagedMemory {
        total_memory_bytes: u64,
        base_address: PhysicalAddress,
    },
    #[error("base address {0} is not page aligned")]
    MisalignedBase(PhysicalAddress),
    #[error("{pages_total} pages cannot hold a {freemap_pages}-page free bitmap and any usable frame")]
    TooSmall {
        pages_total: usize,
        freemap_pages: usize,
    },
    #[error("{managed_bytes} bytes of managed memory exceed the addressable page count")]
    TooLarge { managed_bytes: u64 },
    #[error("{total_memory_megabytes} MB of memory overflow a 64-bit byte count")]
    SizeOverflow { total_memory_megabytes: u64 },
    #[error("the bitmap at {0} is not mapped to suitably aligned memory")]
    UnmappedFreemap(PhysicalAddress),
}
