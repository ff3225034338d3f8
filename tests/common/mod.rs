//! Counting global allocator shared by the allocation tests.
//!
//! Each test binary that includes this module installs the allocator; keep one
//! test per binary so parallel tests do not skew the counts.

#![allow(dead_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use house_mlp::Record;

pub struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
    deallocs: AtomicUsize,
    live_bytes: AtomicIsize,
}

impl CountingAlloc {
    pub const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
            deallocs: AtomicUsize::new(0),
            live_bytes: AtomicIsize::new(0),
        }
    }

    pub fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
        self.deallocs.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AllocSnapshot {
        AllocSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            reallocs: self.reallocs.load(Ordering::Relaxed),
            deallocs: self.deallocs.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }

    /// Bytes currently allocated and not yet freed.
    pub fn live_bytes(&self) -> isize {
        self.live_bytes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocSnapshot {
    pub allocs: usize,
    pub reallocs: usize,
    pub deallocs: usize,
    pub live_bytes: isize,
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_add(layout.size() as isize, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_add(layout.size() as isize, Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.deallocs.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_sub(layout.size() as isize, Ordering::Relaxed);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(
            new_size as isize - layout.size() as isize,
            Ordering::Relaxed,
        );
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// A deterministic spread of house sales covering every problem's classes.
pub fn house_sales(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let sqft = 700.0 + 60.0 * i as f32;
            let price = 120.0 * sqft + 15_000.0 * (i % 5) as f32;
            let waterfront = if i % 6 == 0 { 1.0 } else { 0.0 };
            let bedrooms = (i % 6) as f32;
            Record::new(sqft, price, waterfront, bedrooms)
        })
        .collect()
}
