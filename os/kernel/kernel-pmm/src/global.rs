//! # The Kernel's Page Allocator
//!
//! One [`PageAllocator`] for the whole kernel, created by the boot sequence
//! through [`page_init`] and never torn down. All other subsystems (heap,
//! process creation, page-table setup) go through the functions here.
//!
//! Every call takes a spin lock around the complete allocate/free critical
//! section, so the allocator can be shared once the kernel runs on more than
//! one CPU. The lock does not mask interrupts; do not allocate from interrupt
//! handlers that may preempt a holder.
//!
//! ```ignore
//! use kernel_pmm::{DirectMap, global, halt_machine};
//!
//! // SAFETY: physical memory above 1 MiB is identity mapped and unused.
//! unsafe { global::page_init(total_memory_mb, MAIN_MEMORY_START, DirectMap::IDENTITY) }?;
//! let stack = global::page_alloc_or_halt(true, halt_machine)?;
//! ```

use crate::addresses::PhysicalAddress;
use crate::config::PageAllocConfig;
use crate::error::PageAllocError;
use crate::halt::fail_stop;
use crate::page_alloc::{PageAllocator, PageStats};
use crate::phys_mapper::DirectMap;
use log::warn;
use spin::{Mutex, Once};

static PAGES: Once<Mutex<PageAllocator<DirectMap>>> = Once::new();

/// Initializes the kernel page allocator over
/// `[base_address, total_memory_megabytes MiB)`.
///
/// # Errors
/// [`PageAllocError::Configuration`] if the layout is unusable, which leaves
/// the allocator uninitialized; [`PageAllocError::AlreadyInitialized`] on any
/// call after a successful one.
///
/// # Safety
/// See [`PageAllocator::init`]: the range must be mapped through `mapper`,
/// writable, and belong to the allocator from now on.
pub unsafe fn page_init(
    total_memory_megabytes: u64,
    base_address: u64,
    mapper: DirectMap,
) -> Result<(), PageAllocError> {
    let config = PageAllocConfig::from_megabytes(total_memory_megabytes, base_address)?;
    // SAFETY: forwarded to the caller.
    unsafe { page_init_with(&config, mapper) }
}

/// Like [`page_init`], with full control over the configuration.
///
/// # Errors
/// See [`page_init`].
///
/// # Safety
/// See [`page_init`].
pub unsafe fn page_init_with(
    config: &PageAllocConfig,
    mapper: DirectMap,
) -> Result<(), PageAllocError> {
    let mut ran = false;
    PAGES.try_call_once(|| {
        ran = true;
        // SAFETY: forwarded to the caller.
        unsafe { PageAllocator::init(config, mapper) }
            .map(Mutex::new)
            .map_err(PageAllocError::from)
    })?;

    if ran {
        Ok(())
    } else {
        Err(PageAllocError::AlreadyInitialized)
    }
}

fn with_pages<R>(
    f: impl FnOnce(&mut PageAllocator<DirectMap>) -> Result<R, PageAllocError>,
) -> Result<R, PageAllocError> {
    let Some(pages) = PAGES.get() else {
        warn!("memory: not initialized yet!");
        return Err(PageAllocError::NotInitialized);
    };
    f(&mut pages.lock())
}

/// Allocates one page frame, zero-filled if `zero` is set.
///
/// # Errors
/// [`PageAllocError::NotInitialized`] before [`page_init`], otherwise see
/// [`PageAllocator::allocate`].
pub fn page_alloc(zero: bool) -> Result<PhysicalAddress, PageAllocError> {
    with_pages(|pages| pages.allocate(zero))
}

/// [`page_alloc`], except that running out of memory stops the machine via
/// `halt` instead of returning.
///
/// # Errors
/// Only the non-fatal errors of [`page_alloc`].
pub fn page_alloc_or_halt(
    zero: bool,
    halt: fn() -> !,
) -> Result<PhysicalAddress, PageAllocError> {
    page_alloc(zero).or_else(|err| {
        if err.is_fatal() {
            fail_stop(&err, halt)
        } else {
            Err(err)
        }
    })
}

/// Returns a page frame obtained from [`page_alloc`].
///
/// # Errors
/// [`PageAllocError::NotInitialized`] before [`page_init`], otherwise see
/// [`PageAllocator::free`].
pub fn page_free(address: impl Into<PhysicalAddress>) -> Result<(), PageAllocError> {
    let address = address.into();
    with_pages(|pages| pages.free(address))
}

/// Free and total frame counts; `(0, 0)` before [`page_init`].
#[must_use]
pub fn page_stats() -> PageStats {
    PAGES
        .get()
        .map_or_else(PageStats::default, |pages| pages.lock().stats())
}

/// Whether [`page_init`] has completed.
#[must_use]
pub fn is_initialized() -> bool {
    PAGES.is_completed()
}
