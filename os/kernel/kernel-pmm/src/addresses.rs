//! # Physical Addresses and Page Numbers
//!
//! Strongly typed wrappers for the two ways the allocator refers to a frame:
//! the raw [`PhysicalAddress`] handed to and received from callers, and the
//! dense [`PageNumber`] used to index the free bitmap.
//!
//! Conversions between the two only go through a [`ManagedRegion`], which
//! checks that the address lies inside the region and sits on a page
//! boundary. There is no way to turn an arbitrary integer into a
//! [`PageNumber`] outside this crate.

use core::fmt;
use core::ops::{Add, AddAssign};
use kernel_info::memory::{PAGE_BITS, PAGE_OFFSET_MASK, PAGE_SIZE};

/// Physical memory address.
///
/// A thin `u64` wrapper that keeps physical addresses apart from plain
/// integers and from pointers in the current address space.
///
/// ### Examples
/// ```rust
/// # use kernel_pmm::PhysicalAddress;
/// let pa = PhysicalAddress::new(0x0010_2000);
/// assert!(pa.is_page_aligned());
/// assert_eq!((pa + 0x10).as_u64(), 0x0010_2010);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the low [`PAGE_BITS`] bits are clear.
    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & PAGE_OFFSET_MASK == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(a: PhysicalAddress) -> Self {
        a.as_u64()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Zero-based index of a page frame within a [`ManagedRegion`].
///
/// Values are only produced by [`ManagedRegion`] lookups and by the allocator
/// itself, so a `PageNumber` refers to a frame of the region it was obtained
/// from. Nothing ties it to that region, so allocators check the bound again.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageNumber(usize);

impl PageNumber {
    /// The first frame of the region.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page #{}", self.0)
    }
}

/// Why an address could not be turned into a [`PageNumber`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address lies outside the managed region")]
    OutOfRange,
    #[error("address is not page aligned")]
    Misaligned,
}

/// The contiguous physical range `[base, base + pages_total * PAGE_SIZE)`
/// handed to the page allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ManagedRegion {
    base: PhysicalAddress,
    pages_total: usize,
}

impl ManagedRegion {
    /// Callers must ensure `base + pages_total * PAGE_SIZE` does not overflow;
    /// [`PageAllocConfig::layout`](crate::PageAllocConfig::layout) does.
    #[inline]
    #[must_use]
    pub(crate) const fn new(base: PhysicalAddress, pages_total: usize) -> Self {
        Self { base, pages_total }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn pages_total(&self) -> usize {
        self.pages_total
    }

    /// First address past the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + (self.pages_total as u64) * PAGE_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, address: PhysicalAddress) -> bool {
        address.as_u64() >= self.base.as_u64() && address.as_u64() < self.end().as_u64()
    }

    /// The page with the given index, if the region has one.
    #[inline]
    #[must_use]
    pub const fn page(&self, index: usize) -> Option<PageNumber> {
        if index < self.pages_total {
            Some(PageNumber::new(index))
        } else {
            None
        }
    }

    /// Maps a page-aligned address inside the region to its page number.
    ///
    /// # Errors
    /// [`AddressError::OutOfRange`] is checked before
    /// [`AddressError::Misaligned`].
    ///
    /// ```rust
    /// # use kernel_pmm::{AddressError, PageAllocConfig, PhysicalAddress};
    /// let layout = PageAllocConfig::new(2 * 1024 * 1024, 0x10_0000).layout().unwrap();
    /// let region = layout.region();
    /// assert_eq!(region.page_of(PhysicalAddress::new(0x10_3000)).unwrap().index(), 3);
    /// assert_eq!(region.page_of(PhysicalAddress::new(0x10_3008)), Err(AddressError::Misaligned));
    /// assert_eq!(region.page_of(PhysicalAddress::new(0x0F_F000)), Err(AddressError::OutOfRange));
    /// ```
    #[allow(clippy::cast_possible_truncation)]
    pub const fn page_of(&self, address: PhysicalAddress) -> Result<PageNumber, AddressError> {
        let Some(offset) = address.as_u64().checked_sub(self.base.as_u64()) else {
            return Err(AddressError::OutOfRange);
        };
        let index = offset >> PAGE_BITS;
        if index >= self.pages_total as u64 {
            return Err(AddressError::OutOfRange);
        }
        if offset & PAGE_OFFSET_MASK != 0 {
            return Err(AddressError::Misaligned);
        }
        Ok(PageNumber::new(index as usize))
    }

    /// Base address of the given page.
    #[inline]
    #[must_use]
    pub const fn address_of(&self, page: PageNumber) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + ((page.index() as u64) << PAGE_BITS))
    }
}
