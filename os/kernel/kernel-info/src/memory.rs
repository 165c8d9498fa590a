//! # Memory Layout

/// One kibibyte.
pub const KILO: u64 = 1024;

/// One mebibyte.
pub const MEGA: u64 = 1024 * KILO;

/// Size of a physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the shift between a page number and its address offset.
pub const PAGE_BITS: u32 = 12;

/// First physical address above the reserved low memory.
///
/// This is where the physical page allocator places its free bitmap, and
/// page number 0 refers to the frame starting here.
pub const MAIN_MEMORY_START: u64 = 0x0010_0000; // 1 MiB

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(1 << PAGE_BITS == PAGE_SIZE);
    assert!(MAIN_MEMORY_START.is_multiple_of(PAGE_SIZE));
    assert!(PAGE_SIZE.is_multiple_of(size_of::<u32>() as u64));
};
