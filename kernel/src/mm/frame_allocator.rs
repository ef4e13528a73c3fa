//! Physical Frame Allocator
//!
//! Manages physical memory pages using a bitmap allocation strategy.
//! The rest of the kernel consumes it only through [`FrameAllocator`].

use super::memory_layout::*;
use crate::config::{PAGE_SIZE, PAGE_SIZE_BITS};
use alloc::sync::Arc;
use alloc::vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Maximum number of physical frames (128MB / 4KB = 32K frames)
const MAX_FRAMES: usize = 32768;

const BITS_PER_WORD: usize = core::mem::size_of::<usize>() * 8;

/// Frame allocator trait for abstraction
pub trait FrameAllocator {
    /// Hand out one zeroed frame, or `None` when memory is exhausted.
    fn alloc(&self) -> Option<PhysPageNum>;
    fn dealloc(&self, ppn: PhysPageNum);
}

/// Bitmap-based frame allocator
pub struct BitmapFrameAllocator {
    /// Start physical page number
    start_ppn: usize,
    /// End physical page number
    end_ppn: usize,
    /// Bitmap for tracking allocated frames (1 = allocated, 0 = free)
    bitmap: [AtomicUsize; MAX_FRAMES / BITS_PER_WORD],
    /// Next frame to try allocating (optimization)
    next: AtomicUsize,
}

impl BitmapFrameAllocator {
    /// Create an allocator over the physical range `[start, end)`.
    ///
    /// Ranges larger than `MAX_FRAMES` frames are clipped.
    pub fn new(start: usize, end: usize) -> Self {
        const ATOMIC_ZERO: AtomicUsize = AtomicUsize::new(0);
        let start_ppn = align_up(start) >> PAGE_SIZE_BITS;
        let end_ppn = (align_down(end) >> PAGE_SIZE_BITS).min(start_ppn + MAX_FRAMES);
        Self {
            start_ppn,
            end_ppn: end_ppn.max(start_ppn),
            bitmap: [ATOMIC_ZERO; MAX_FRAMES / BITS_PER_WORD],
            next: AtomicUsize::new(0),
        }
    }

    /// Build an allocator over `frames` page-aligned frames carved out of
    /// the kernel heap. The backing memory is never returned to the heap.
    pub fn leak_pool(frames: usize) -> Self {
        #[derive(Clone)]
        #[repr(C, align(4096))]
        struct Frame([u8; PAGE_SIZE]);

        let pool = vec![Frame([0; PAGE_SIZE]); frames.max(1)].leak();
        let start = pool.as_ptr() as usize;
        Self::new(start, start + frames * PAGE_SIZE)
    }

    fn locate(idx: usize) -> (usize, usize) {
        (idx / BITS_PER_WORD, 1usize << (idx % BITS_PER_WORD))
    }

    /// Allocate a physical frame
    pub fn alloc(&self) -> Option<PhysPageNum> {
        let total_frames = self.total_frames();
        if total_frames == 0 {
            return None;
        }
        let start_idx = self.next.load(Ordering::Relaxed);

        // Search from next position
        for offset in 0..total_frames {
            let idx = (start_idx + offset) % total_frames;
            let (word, mask) = Self::locate(idx);

            let old_val = self.bitmap[word].load(Ordering::Acquire);

            // If bit is 0 (free), try to set it to 1 (allocated)
            if (old_val & mask) == 0
                && self.bitmap[word]
                    .compare_exchange(old_val, old_val | mask, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.next.store((idx + 1) % total_frames, Ordering::Relaxed);
                let ppn = PhysPageNum::new(self.start_ppn + idx);

                // Zero out the frame for security
                unsafe {
                    core::ptr::write_bytes(ppn.as_ptr::<u8>(), 0, PAGE_SIZE);
                }
                return Some(ppn);
            }
        }

        None // Out of memory
    }

    /// Deallocate a physical frame
    pub fn dealloc(&self, ppn: PhysPageNum) {
        let ppn_val = ppn.as_usize();
        if ppn_val < self.start_ppn || ppn_val >= self.end_ppn {
            log::warn!("dealloc of foreign frame {:#x}", ppn_val);
            return;
        }

        let (word, mask) = Self::locate(ppn_val - self.start_ppn);
        let prev = self.bitmap[word].fetch_and(!mask, Ordering::Release);
        assert!(prev & mask != 0, "frame {:#x} freed twice", ppn_val);
    }

    /// Get number of free frames
    pub fn free_frames(&self) -> usize {
        (0..self.total_frames())
            .filter(|&idx| {
                let (word, mask) = Self::locate(idx);
                self.bitmap[word].load(Ordering::Relaxed) & mask == 0
            })
            .count()
    }

    /// Get total number of frames
    pub fn total_frames(&self) -> usize {
        self.end_ppn - self.start_ppn
    }
}

impl FrameAllocator for BitmapFrameAllocator {
    fn alloc(&self) -> Option<PhysPageNum> {
        BitmapFrameAllocator::alloc(self)
    }

    fn dealloc(&self, ppn: PhysPageNum) {
        BitmapFrameAllocator::dealloc(self, ppn)
    }
}

/// Frame tracker - automatically frees frame when dropped
pub struct FrameTracker {
    pub ppn: PhysPageNum,
    allocator: Arc<dyn FrameAllocator>,
}

impl FrameTracker {
    /// Take one frame from `allocator`, owned until the tracker is dropped.
    pub fn alloc(allocator: &Arc<dyn FrameAllocator>) -> Option<Self> {
        allocator.alloc().map(|ppn| Self {
            ppn,
            allocator: Arc::clone(allocator),
        })
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        self.allocator.dealloc(self.ppn);
    }
}

impl core::fmt::Debug for FrameTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FrameTracker(PPN={:#x})", self.ppn.as_usize())
    }
}
