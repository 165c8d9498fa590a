//! The free bitmap: one bit per page frame, `1` = free, `0` = allocated.
//!
//! Bit `b` of cell `i` tracks page number `i * CELL_BITS + b`. Padding bits in
//! the last cell (those past the final page) are always kept at `0`, so a scan
//! for set bits can never hand out a frame that does not exist.

use core::ptr::NonNull;
use core::slice;

/// Storage unit of the bitmap.
pub type Cell = u32;

/// Number of pages tracked by a single [`Cell`].
pub const CELL_BITS: usize = Cell::BITS as usize;

/// Cell index and bit mask for a page.
#[inline]
const fn locate(page: usize) -> (usize, Cell) {
    (page / CELL_BITS, 1 << (page % CELL_BITS))
}

/// Bitmap over externally provided cell storage.
///
/// # Invariants
/// - `cells` points to `len` cells that are valid, writable and exclusively
///   owned by this bitmap for its whole lifetime.
/// - `len == pages.div_ceil(CELL_BITS)`.
pub(crate) struct Freemap {
    cells: NonNull<Cell>,
    len: usize,
    pages: usize,
}

// Safety: the bitmap owns its storage exclusively; moving it between threads
// moves that ownership along with it.
unsafe impl Send for Freemap {}

impl Freemap {
    /// Number of cells needed to track `pages` pages.
    #[inline]
    pub(crate) const fn cells_for(pages: usize) -> usize {
        pages.div_ceil(CELL_BITS)
    }

    /// Wraps raw cell storage. The contents are unspecified until
    /// [`fill_free`](Self::fill_free) is called.
    ///
    /// # Safety
    /// - `cells` must be valid for reads and writes of `Self::cells_for(pages)`
    ///   cells and properly aligned for [`Cell`].
    /// - Nothing else may access that memory while the bitmap is alive.
    pub(crate) const unsafe fn from_raw(cells: NonNull<Cell>, pages: usize) -> Self {
        Self {
            cells,
            len: Self::cells_for(pages),
            pages,
        }
    }

    fn cells(&self) -> &[Cell] {
        // SAFETY: struct invariant.
        unsafe { slice::from_raw_parts(self.cells.as_ptr(), self.len) }
    }

    fn cells_mut(&mut self) -> &mut [Cell] {
        // SAFETY: struct invariant; `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.cells.as_ptr(), self.len) }
    }

    #[inline]
    pub(crate) const fn cell_count(&self) -> usize {
        self.len
    }

    /// Marks every page free and clears the padding bits of the last cell.
    pub(crate) fn fill_free(&mut self) {
        let tail = self.pages % CELL_BITS;
        let cells = self.cells_mut();
        cells.fill(Cell::MAX);
        if tail != 0
            && let Some(last) = cells.last_mut()
        {
            *last = (1 << tail) - 1;
        }
    }

    /// Clears the lowest set bit in the map and returns its page number.
    pub(crate) fn take_lowest_free(&mut self) -> Option<usize> {
        let cells = self.cells_mut();
        let (index, cell) = cells.iter_mut().enumerate().find(|(_, c)| **c != 0)?;
        let bit = cell.trailing_zeros() as usize;
        *cell &= !(1 << bit);
        let page = index * CELL_BITS + bit;
        debug_assert!(page < self.pages, "padding bit {page} was set");
        Some(page)
    }

    #[inline]
    pub(crate) fn is_free(&self, page: usize) -> bool {
        debug_assert!(page < self.pages);
        let (cell, mask) = locate(page);
        self.cells()[cell] & mask != 0
    }

    /// Sets the page's bit. Returns `false` if it was already free.
    pub(crate) fn mark_free(&mut self, page: usize) -> bool {
        debug_assert!(page < self.pages);
        let (cell, mask) = locate(page);
        let cell = &mut self.cells_mut()[cell];
        let was_allocated = *cell & mask == 0;
        *cell |= mask;
        was_allocated
    }

    /// Clears the page's bit. Returns `false` if it was already allocated.
    pub(crate) fn mark_allocated(&mut self, page: usize) -> bool {
        debug_assert!(page < self.pages);
        let (cell, mask) = locate(page);
        let cell = &mut self.cells_mut()[cell];
        let was_free = *cell & mask != 0;
        *cell &= !mask;
        was_free
    }

    /// Population count over the whole map.
    #[cfg(test)]
    pub(crate) fn count_free(&self) -> usize {
        self.cells().iter().map(|c| c.count_ones() as usize).sum()
    }
}
