//! # Kernel Physical Memory Layout
//!
//! This crate is the single source of truth for the constants that describe
//! how the kernel carves up physical memory. Everything that needs to agree on
//! page geometry or on where "main memory" begins (the page allocator, boot
//! code, anything that converts between addresses and frame numbers) reads the
//! values from here instead of defining its own.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000       ┌─────────────────────────────────┐
//!                   │     Low Memory (< 1 MiB)        │
//!                   │  (BIOS, VGA, real-mode data)    │
//! MAIN_MEMORY_START ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!                   │  Free bitmap (self-hosted)      │
//!                   ├─────────────────────────────────┤
//!                   │  Page frames handed out by the  │
//!                   │  physical page allocator        │
//! total_memory      └─────────────────────────────────┘
//! ```
//!
//! Low memory is never managed. The page allocator takes over everything from
//! [`MAIN_MEMORY_START`](memory::MAIN_MEMORY_START) up to the detected end of
//! physical memory and keeps its own bookkeeping at the very start of that range.
//!
//! ## Compile-Time Checks
//!
//! The layout constants are validated with `const` assertions, so an
//! inconsistent configuration (e.g. a page size that is not a power of two, or
//! a main memory start that is not page aligned) fails the build rather than
//! corrupting memory at runtime.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
