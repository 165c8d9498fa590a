use kernel_info::memory::{MAIN_MEMORY_START, MEGA, PAGE_SIZE};
use kernel_pmm::{
    AddressError, ConfigError, DirectMap, InvalidFreeReason, PageAllocConfig, PageAllocError,
    PageAllocator, PageNumber, PageStats, PhysMapper, PhysicalAddress,
};
use std::collections::HashSet;

const BASE: u64 = MAIN_MEMORY_START;
const FRAME: usize = PAGE_SIZE as usize;

/// Host buffer standing in for physical memory `[BASE, BASE + pages * PAGE_SIZE)`.
struct Machine {
    _memory: Vec<u64>,
    mapper: DirectMap,
}

impl Machine {
    fn new(pages: u64, fill: u64) -> Self {
        let words = usize::try_from(pages * PAGE_SIZE / 8).unwrap();
        let mut memory = vec![fill; words];
        let mapper = DirectMap::for_buffer(PhysicalAddress::new(BASE), memory.as_mut_ptr());
        Self {
            _memory: memory,
            mapper,
        }
    }

    fn frame(&self, pa: PhysicalAddress) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.mapper.phys_to_ptr::<u8>(pa), FRAME) }
    }
}

fn boot(pages: u64) -> (Machine, PageAllocator) {
    boot_with(pages, 0, PageAllocConfig::new(BASE + pages * PAGE_SIZE, BASE))
}

fn boot_with(pages: u64, fill: u64, config: PageAllocConfig) -> (Machine, PageAllocator) {
    let machine = Machine::new(pages, fill);
    let allocator = unsafe { PageAllocator::init(&config, machine.mapper) }.unwrap();
    (machine, allocator)
}

fn allocated_pages(allocator: &PageAllocator) -> usize {
    let region = allocator.region();
    (0..region.pages_total())
        .filter(|&i| allocator.is_allocated(region.page(i).unwrap()).unwrap())
        .count()
}

#[test]
fn thirty_two_megabytes_above_one_megabyte() {
    let pages = (32 * MEGA - BASE) / PAGE_SIZE;
    let config = PageAllocConfig::main_memory(32).unwrap();
    let (_machine, allocator) = boot_with(pages, 0, config);

    assert_eq!(allocator.stats().total, 7936);
    assert_eq!(allocator.stats().free, 7935);
    assert_eq!(allocator.freemap_pages(), 1);
    assert_eq!(allocator.freemap_cells(), 248);
    assert_eq!(allocator.region().end().as_u64(), 32 * MEGA);
}

#[test]
fn stats_report_free_and_total() {
    let (_machine, mut allocator) = boot(100);
    let stats = allocator.stats();
    assert_eq!(stats, PageStats { free: 99, total: 100 });
    assert_eq!(<(usize, usize)>::from(stats), (99, 100));

    allocator.allocate(false).unwrap();
    assert_eq!(allocator.stats().allocated(), 2);
}

#[test]
fn page_zero_is_allocated_after_init() {
    let (_machine, mut allocator) = boot(64);
    assert_eq!(allocator.is_allocated(PageNumber::ZERO), Ok(true));
    assert_eq!(
        allocator.free(PhysicalAddress::new(BASE)),
        Err(PageAllocError::InvalidFree {
            address: PhysicalAddress::new(BASE),
            reason: InvalidFreeReason::Reserved,
        })
    );
}

#[test]
fn consecutive_allocations_are_lowest_first() {
    let (_machine, mut allocator) = boot(200);
    let pages: Vec<usize> = (0..150)
        .map(|_| {
            let pa = allocator.allocate(false).unwrap();
            allocator.page_number(pa).unwrap().index()
        })
        .collect();

    assert_eq!(pages[0], allocator.freemap_pages());
    assert!(pages.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn freed_frame_is_handed_out_again() {
    let (_machine, mut allocator) = boot(64);
    let a = allocator.allocate(false).unwrap();
    allocator.free(a).unwrap();
    assert_eq!(allocator.allocate(false).unwrap(), a);

    // A freed frame below the scan frontier wins over untouched ones.
    let frames: Vec<_> = (0..5).map(|_| allocator.allocate(false).unwrap()).collect();
    allocator.free(frames[2]).unwrap();
    assert_eq!(allocator.allocate(false).unwrap(), frames[2]);
}

#[test]
fn never_hands_out_the_bitmap_frames() {
    // One page more than a single bitmap page can describe.
    let pages = 32_769;
    let (_machine, mut allocator) = boot(pages);
    assert_eq!(allocator.freemap_pages(), 2);
    assert_eq!(allocator.is_allocated(PageNumber::ZERO), Ok(true));
    assert_eq!(
        allocator.is_allocated(allocator.region().page(1).unwrap()),
        Ok(true)
    );

    let bitmap_end = BASE + 2 * PAGE_SIZE;
    let first = allocator.allocate(false).unwrap();
    assert_eq!(first.as_u64(), bitmap_end);
    for _ in 0..1_000 {
        let pa = allocator.allocate(false).unwrap();
        assert!(pa.as_u64() >= bitmap_end);
    }
    assert_eq!(allocator.stats().free, 32_769 - 2 - 1_001);
}

#[test]
fn exhaustion_is_reported_once_then_halts() {
    let (_machine, mut allocator) = boot(100);
    let available = allocator.stats().free;
    assert_eq!(available, 99);

    let mut seen = HashSet::new();
    for _ in 0..available {
        let pa = allocator.allocate(false).unwrap();
        assert!(allocator.region().contains(pa));
        assert!(seen.insert(pa));
    }
    assert_eq!(allocator.stats().free, 0);
    assert!(!allocator.is_halted());

    assert_eq!(allocator.allocate(false), Err(PageAllocError::OutOfMemory));
    assert!(allocator.is_halted());
    for _ in 0..3 {
        assert_eq!(allocator.allocate(true), Err(PageAllocError::Halted));
    }

    let some = *seen.iter().next().unwrap();
    assert_eq!(allocator.free(some), Err(PageAllocError::Halted));
    assert_eq!(allocator.stats().free, 0);
}

#[test]
fn padding_bits_are_never_allocated() {
    // 70 pages leave 26 padding bits in the third cell.
    let (_machine, mut allocator) = boot(70);
    let mut last = None;
    while let Ok(pa) = allocator.allocate(false) {
        last = Some(pa);
    }
    assert_eq!(
        last.unwrap().as_u64(),
        BASE + 69 * PAGE_SIZE,
        "last frame must be page 69"
    );
}

#[test]
fn zero_fill_clears_the_whole_frame() {
    let pages = 16;
    let config = PageAllocConfig::new(BASE + pages * PAGE_SIZE, BASE);
    let (machine, mut allocator) = boot_with(pages, 0xAAAA_AAAA_AAAA_AAAA, config);

    let zeroed = allocator.allocate(true).unwrap();
    assert!(machine.frame(zeroed).iter().all(|&b| b == 0));

    let dirty = allocator.allocate(false).unwrap();
    assert!(machine.frame(dirty).iter().all(|&b| b == 0xAA));
}

#[test]
fn invalid_frees_are_rejected_without_side_effects() {
    let (_machine, mut allocator) = boot(64);
    let a = allocator.allocate(false).unwrap();
    let before = allocator.stats();

    let cases = [
        (PhysicalAddress::new(BASE - PAGE_SIZE), InvalidFreeReason::OutOfRange),
        (allocator.region().end(), InvalidFreeReason::OutOfRange),
        (a + 8, InvalidFreeReason::Misaligned),
        (PhysicalAddress::new(BASE + 10 * PAGE_SIZE), InvalidFreeReason::AlreadyFree),
        (PhysicalAddress::new(BASE), InvalidFreeReason::Reserved),
    ];
    for (address, reason) in cases {
        assert_eq!(
            allocator.free(address),
            Err(PageAllocError::InvalidFree { address, reason })
        );
        assert_eq!(allocator.stats(), before);
    }

    allocator.free(a).unwrap();
    assert_eq!(
        allocator.free(a),
        Err(PageAllocError::InvalidFree {
            address: a,
            reason: InvalidFreeReason::AlreadyFree,
        })
    );
    assert_eq!(allocator.stats().free, before.free + 1);
}

#[test]
fn counters_track_the_bitmap_through_mixed_traffic() {
    let (_machine, mut allocator) = boot(300);
    let total = allocator.stats().total;
    let mut held = Vec::new();
    let mut seed: u32 = 0x2545_F491;

    for _ in 0..2_000 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;

        // Stay clear of exhaustion; running dry halts the allocator.
        if held.is_empty() || (seed % 3 != 0 && allocator.stats().free > 0) {
            held.push(allocator.allocate(false).unwrap());
        } else {
            let victim = held.swap_remove(seed as usize % held.len());
            allocator.free(victim).unwrap();
        }

        let stats = allocator.stats();
        assert_eq!(stats.free + allocated_pages(&allocator), total);
        assert_eq!(stats.allocated(), held.len() + allocator.freemap_pages());
    }
}

#[test]
fn page_number_lookup_is_bounds_checked() {
    let (_machine, allocator) = boot(64);
    assert_eq!(
        allocator
            .page_number(PhysicalAddress::new(BASE + 3 * PAGE_SIZE))
            .map(PageNumber::index),
        Ok(3)
    );
    assert_eq!(
        allocator.page_number(PhysicalAddress::new(BASE + 64 * PAGE_SIZE)),
        Err(AddressError::OutOfRange)
    );
    assert_eq!(
        allocator.page_number(PhysicalAddress::new(BASE + 3)),
        Err(AddressError::Misaligned)
    );
}

#[test]
fn rejects_memory_too_small_for_its_bitmap() {
    let config = PageAllocConfig::new(BASE + PAGE_SIZE, BASE);
    let res = unsafe { PageAllocator::init(&config, DirectMap::IDENTITY) };
    assert!(matches!(
        res,
        Err(ConfigError::TooSmall {
            pages_total: 1,
            freemap_pages: 1
        })
    ));

    let config = PageAllocConfig::new(BASE / 2, BASE);
    let res = unsafe { PageAllocator::init(&config, DirectMap::IDENTITY) };
    assert!(matches!(res, Err(ConfigError::NoManagedMemory { .. })));
}

#[test]
fn page_numbers_from_another_region_are_out_of_range() {
    let (_small_machine, small) = boot(64);
    let (_big_machine, big) = boot(1_000);
    let foreign = big.region().page(500).unwrap();

    assert_eq!(small.is_allocated(foreign), Err(AddressError::OutOfRange));
    assert_eq!(
        small.is_allocated(big.region().page(64).unwrap()),
        Err(AddressError::OutOfRange)
    );
    assert_eq!(
        small.is_allocated(small.region().page(63).unwrap()),
        Ok(false)
    );
}

#[test]
fn rejects_a_bitmap_mapped_to_unusable_memory() {
    let pages = 16;
    let config = PageAllocConfig::new(BASE + pages * PAGE_SIZE, BASE);
    let machine = Machine::new(pages, 0);

    // Off by one byte: the cells would be misaligned.
    let skewed = DirectMap::with_offset(machine.mapper.offset().wrapping_add(1));
    let res = unsafe { PageAllocator::init(&config, skewed) };
    assert!(matches!(
        res,
        Err(ConfigError::UnmappedFreemap(pa)) if pa == PhysicalAddress::new(BASE)
    ));

    // The base resolves to the null pointer.
    let null = DirectMap::with_offset(BASE.wrapping_neg());
    let res = unsafe { PageAllocator::init(&config, null) };
    assert!(matches!(res, Err(ConfigError::UnmappedFreemap(_))));
}
