//! # Physical Page Frame Allocator
//!
//! This crate tracks which 4 KiB frames of physical memory are free and hands
//! out page-aligned frames to the rest of the kernel: the heap, page-table
//! setup, and process stacks all get their memory from here.
//!
//! ## Overview
//!
//! The allocator manages one flat region of physical memory, from a base
//! address (by default [`MAIN_MEMORY_START`](kernel_info::memory::MAIN_MEMORY_START),
//! right above reserved low memory) up to the detected end of RAM:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                global::page_* API                   │
//! │    • init once at boot, never torn down             │
//! │    • spin lock around every allocate/free           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 PageAllocator                       │
//! │    • first-fit, lowest page number wins             │
//! │    • validated frees, fail-stop on exhaustion       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │       Free bitmap at the base of the region         │
//! │    • 1 bit per frame, 1 = free                      │
//! │    • claims its own frames during bootstrap         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`PageAllocator`]: the allocator state machine; one value per managed region.
//! * [`PageAllocConfig`] / [`FreemapLayout`]: boot parameters and the bitmap
//!   geometry derived from them.
//! * [`PhysicalAddress`], [`PageNumber`], [`ManagedRegion`]: checked conversion
//!   between frame addresses and bitmap indices.
//! * [`PhysMapper`] / [`DirectMap`]: how the allocator reaches the memory it manages.
//! * [`global`]: the kernel-wide instance.
//! * [`fail_stop`] / [`halt_machine`]: what to do when memory is exhausted.
//!
//! ## Failure Model
//!
//! A kernel without swap has no sensible way to continue once physical memory
//! is gone. Exhaustion is reported as [`PageAllocError::OutOfMemory`] exactly
//! once; after that the allocator refuses all work with
//! [`PageAllocError::Halted`]. Callers that own kernel control flow pass the
//! error to [`fail_stop`], which logs it and halts. Bad frees (foreign,
//! unaligned, reserved or double-freed addresses) are detected and reported as
//! [`PageAllocError::InvalidFree`] without touching allocator state.
//!
//! ## Performance Characteristics
//!
//! * **Allocation**: O(pages / 32) worst case, one scan over the bitmap cells.
//! * **Free / stats**: O(1).
//! * **Memory Overhead**: 1 bit per 4 KiB frame, rounded up to whole pages.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod addresses;
mod config;
mod error;
mod freemap;
pub mod global;
mod halt;
mod page_alloc;
mod phys_mapper;

pub use addresses::{AddressError, ManagedRegion, PageNumber, PhysicalAddress};
pub use config::{ConfigError, FreemapLayout, PageAllocConfig, RESERVE_PAGE_ZERO_DEFAULT};
pub use error::{InvalidFreeReason, PageAllocError};
pub use freemap::CELL_BITS;
pub use halt::{fail_stop, halt_machine};
pub use page_alloc::{PageAllocator, PageStats};
pub use phys_mapper::{DirectMap, PhysMapper};
