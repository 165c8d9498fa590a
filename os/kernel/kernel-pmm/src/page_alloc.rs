//! # Bitmap Page Allocator
//!
//! First-fit physical frame allocator over a single contiguous region.
//!
//! The free bitmap is self-hosted: it is placed at the base of the region it
//! describes, and the frames it occupies are claimed through the regular
//! allocation path right after the map has been filled. From then on the
//! allocator hands out the lowest-numbered free frame on every call, which
//! makes allocation order fully deterministic.
//!
//! ```text
//! base                                                      end
//! ┌───────────────┬───────────────────────────────────────────┐
//! │ free bitmap   │ frames handed out lowest-first            │
//! │ (page 0..n-1) │ (page n ..)                               │
//! └───────────────┴───────────────────────────────────────────┘
//! ```
//!
//! ## Life cycle
//!
//! [`PageAllocator::init`] is the only way to obtain an allocator, so there is
//! no "not yet initialized" state at this level. Once the map runs dry the
//! allocator reports [`PageAllocError::OutOfMemory`] a single time and latches
//! into a halted state in which every further call fails with
//! [`PageAllocError::Halted`]. The kernel is expected to stop long before it
//! gets there; see [`fail_stop`](crate::fail_stop).

use crate::addresses::{AddressError, ManagedRegion, PageNumber, PhysicalAddress};
use crate::config::{ConfigError, PageAllocConfig};
use crate::error::{InvalidFreeReason, PageAllocError};
use crate::freemap::{Cell, Freemap};
use crate::phys_mapper::{DirectMap, PhysMapper};
use core::ptr::NonNull;
use kernel_info::memory::{KILO, MEGA, PAGE_SIZE};
use log::{debug, error, info, trace, warn};

#[allow(clippy::cast_possible_truncation)]
const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// Snapshot of the allocator's counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Frames currently free.
    pub free: usize,
    /// Frames in the managed region, including the bitmap and reserved ones.
    pub total: usize,
}

impl PageStats {
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.total - self.free
    }
}

impl From<PageStats> for (usize, usize) {
    fn from(value: PageStats) -> Self {
        (value.free, value.total)
    }
}

/// Physical page frame allocator.
///
/// # Invariants
/// - `pages_free` equals the number of free bits in `freemap`.
/// - Pages `0..freemap_pages` (the bitmap's own frames) are never free.
/// - With `reserve_page_zero`, page 0 is never free.
pub struct PageAllocator<M: PhysMapper = DirectMap> {
    mapper: M,
    region: ManagedRegion,
    freemap: Freemap,
    freemap_pages: usize,
    pages_free: usize,
    reserve_page_zero: bool,
    halted: bool,
}

impl<M: PhysMapper> PageAllocator<M> {
    /// Sets up the allocator over the region described by `config`, storing
    /// the free bitmap at the region's base.
    ///
    /// # Errors
    /// Any [`ConfigError`] from [`PageAllocConfig::layout`], or
    /// [`ConfigError::UnmappedFreemap`] if `mapper` yields a null or
    /// misaligned pointer for the region's base.
    ///
    /// # Safety
    /// - Every byte of the managed region must be mapped by `mapper` to
    ///   writable memory.
    /// - The region must be owned exclusively by the returned allocator for
    ///   its entire lifetime; frames handed out transfer that ownership to the
    ///   caller until they are freed.
    pub unsafe fn init(config: &PageAllocConfig, mapper: M) -> Result<Self, ConfigError> {
        let layout = config.layout()?;
        let region = layout.region();
        let total = config.total_memory_bytes();

        info!("total memory: {} MB ({} KB)", total / MEGA, total / KILO);
        let managed = region.end().as_u64() - region.base().as_u64();
        info!(
            "memory: {} MB ({} KB) total",
            managed / MEGA,
            managed / KILO
        );
        info!(
            "memory: {} bits {} bytes {} cells {} pages",
            layout.pages_total(),
            layout.freemap_bytes(),
            layout.freemap_cells(),
            layout.freemap_pages()
        );

        // SAFETY: the caller guarantees the region is mapped.
        let cells = unsafe { mapper.phys_to_ptr::<Cell>(region.base()) };
        let cells = NonNull::new(cells)
            .filter(|p| p.as_ptr().is_aligned())
            .ok_or(ConfigError::UnmappedFreemap(region.base()))?;

        // SAFETY: the bitmap fits into the first `freemap_pages` frames of the
        // region, which the caller hands over exclusively.
        let mut freemap = unsafe { Freemap::from_raw(cells, layout.pages_total()) };
        freemap.fill_free();

        let mut allocator = Self {
            mapper,
            region,
            freemap,
            freemap_pages: layout.freemap_pages(),
            pages_free: layout.pages_total(),
            reserve_page_zero: config.reserve_page_zero(),
            halted: false,
        };

        // The bitmap claims its own frames through the normal path.
        for _ in 0..layout.freemap_pages() {
            allocator
                .allocate(false)
                .map_err(|_| ConfigError::TooSmall {
                    pages_total: layout.pages_total(),
                    freemap_pages: layout.freemap_pages(),
                })?;
        }

        if allocator.reserve_page_zero {
            allocator.reserve(PageNumber::ZERO);
        }

        let available = allocator.pages_free as u64 * PAGE_SIZE;
        info!(
            "memory: {} MB ({} KB) available",
            available / MEGA,
            available / KILO
        );
        Ok(allocator)
    }

    /// Takes the lowest-numbered free frame, optionally zero-filled.
    ///
    /// # Errors
    /// [`PageAllocError::OutOfMemory`] on the call that finds the bitmap
    /// empty, [`PageAllocError::Halted`] on every call after that.
    pub fn allocate(&mut self, zero: bool) -> Result<PhysicalAddress, PageAllocError> {
        if self.halted {
            return Err(PageAllocError::Halted);
        }

        let Some(index) = self.freemap.take_lowest_free() else {
            self.halted = true;
            error!(
                "memory: everything allocated ({} pages)",
                self.region.pages_total()
            );
            return Err(PageAllocError::OutOfMemory);
        };

        let page = PageNumber::new(index);
        let address = self.region.address_of(page);
        if zero {
            // SAFETY: the frame lies inside the mapped region and was free, so
            // nobody else holds it.
            unsafe {
                self.mapper
                    .phys_to_ptr::<u8>(address)
                    .write_bytes(0, PAGE_BYTES);
            }
        }
        self.pages_free -= 1;
        trace!("memory: allocated {page} at {address}");
        Ok(address)
    }

    /// Returns a frame previously obtained from [`allocate`](Self::allocate).
    ///
    /// Frees of addresses outside the region, of unaligned addresses, of the
    /// allocator's own reserved frames, and of frames that are already free
    /// are rejected and leave the allocator untouched.
    ///
    /// # Errors
    /// [`PageAllocError::InvalidFree`] for the cases above,
    /// [`PageAllocError::Halted`] once the allocator has run dry.
    pub fn free(&mut self, address: PhysicalAddress) -> Result<(), PageAllocError> {
        if self.halted {
            return Err(PageAllocError::Halted);
        }

        let page = self
            .region
            .page_of(address)
            .map_err(|e| Self::reject(address, e.into()))?;
        if self.is_reserved(page) {
            return Err(Self::reject(address, InvalidFreeReason::Reserved));
        }
        if !self.freemap.mark_free(page.index()) {
            return Err(Self::reject(address, InvalidFreeReason::AlreadyFree));
        }

        self.pages_free += 1;
        trace!("memory: freed {page} at {address}");
        Ok(())
    }

    #[must_use]
    pub const fn stats(&self) -> PageStats {
        PageStats {
            free: self.pages_free,
            total: self.region.pages_total(),
        }
    }

    /// Whether `page` is currently handed out or reserved.
    ///
    /// # Errors
    /// [`AddressError::OutOfRange`] if `page` lies past the end of this
    /// allocator's region, e.g. because it came from a different region.
    pub fn is_allocated(&self, page: PageNumber) -> Result<bool, AddressError> {
        if page.index() >= self.region.pages_total() {
            return Err(AddressError::OutOfRange);
        }
        Ok(!self.freemap.is_free(page.index()))
    }

    /// Page number of a frame address in this allocator's region.
    ///
    /// # Errors
    /// See [`ManagedRegion::page_of`].
    pub const fn page_number(&self, address: PhysicalAddress) -> Result<PageNumber, AddressError> {
        self.region.page_of(address)
    }

    #[must_use]
    pub const fn region(&self) -> ManagedRegion {
        self.region
    }

    /// Frames occupied by the free bitmap, starting at page 0.
    #[must_use]
    pub const fn freemap_pages(&self) -> usize {
        self.freemap_pages
    }

    #[must_use]
    pub const fn freemap_cells(&self) -> usize {
        self.freemap.cell_count()
    }

    /// Whether the allocator ran out of memory and stopped serving requests.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    fn is_reserved(&self, page: PageNumber) -> bool {
        page.index() < self.freemap_pages || (self.reserve_page_zero && page == PageNumber::ZERO)
    }

    /// Forces a page into the allocated state; idempotent.
    fn reserve(&mut self, page: PageNumber) {
        if self.freemap.mark_allocated(page.index()) {
            self.pages_free -= 1;
        }
        debug!("memory: {page} reserved");
    }

    fn reject(address: PhysicalAddress, reason: InvalidFreeReason) -> PageAllocError {
        warn!("memory: rejected free of {address}: {reason}");
        PageAllocError::InvalidFree { address, reason }
    }
}
