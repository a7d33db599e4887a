//! Heap accounting through the global allocator
//!
//! The binary installs [`CountingAllocator`] as its `#[global_allocator]`.
//! Library consumers that don't will simply read zeros from [`heap_stats`].

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTERS: HeapCounters = HeapCounters::new();

/// Live and peak heap byte counters
#[derive(Debug)]
pub struct HeapCounters {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl HeapCounters {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Record an allocation of `size` bytes
    pub fn on_alloc(&self, size: usize) {
        let live = self.live.fetch_add(size, Ordering::Relaxed) + size;
        self.peak.fetch_max(live, Ordering::Relaxed);
    }

    /// Record a deallocation of `size` bytes
    pub fn on_dealloc(&self, size: usize) {
        self.live.fetch_sub(size, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HeapStats {
        HeapStats {
            used: self.live.load(Ordering::Relaxed) as u64,
            total: self.peak.load(Ordering::Relaxed) as u64,
        }
    }
}

impl Default for HeapCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Heap statistics in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes currently allocated
    pub used: u64,
    /// High-water mark of `used`
    pub total: u64,
}

/// Global allocator that forwards to [`System`] and counts bytes
pub struct CountingAllocator;

// SAFETY: every call is forwarded unchanged to the system allocator; the
// counters never touch the returned memory.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            COUNTERS.on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            COUNTERS.on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        COUNTERS.on_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            COUNTERS.on_dealloc(layout.size());
            COUNTERS.on_alloc(new_size);
        }
        new_ptr
    }
}

/// Current heap statistics of this process
pub fn heap_stats() -> HeapStats {
    COUNTERS.snapshot()
}

/// Whether [`CountingAllocator`] has seen any allocation
pub fn is_tracking() -> bool {
    COUNTERS.snapshot().total > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_live_and_peak() {
        let counters = HeapCounters::new();
        counters.on_alloc(1000);
        counters.on_alloc(500);
        counters.on_dealloc(1000);

        let stats = counters.snapshot();
        assert_eq!(stats.used, 500);
        assert_eq!(stats.total, 1500);

        counters.on_alloc(200);
        let stats = counters.snapshot();
        assert_eq!(stats.used, 700);
        assert_eq!(stats.total, 1500);
    }

    #[test]
    fn test_allocator_roundtrip() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = CountingAllocator.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = CountingAllocator.realloc(ptr, layout, 128);
            assert!(!ptr.is_null());
            CountingAllocator.dealloc(ptr, Layout::from_size_align(128, 8).unwrap());
        }
        assert!(is_tracking());
    }
}
