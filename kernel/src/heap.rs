//! Kernel heap
//!
//! A buddy allocator over a static `.bss` region backs `alloc` in the
//! board image.

use stride_kernel::config::KERNEL_HEAP_SIZE;
use buddy_system_allocator::LockedHeap;

#[global_allocator]
static HEAP_ALLOCATOR: LockedHeap<32> = LockedHeap::empty();

static mut HEAP_SPACE: [u8; KERNEL_HEAP_SIZE] = [0; KERNEL_HEAP_SIZE];

/// Hand the heap region to the allocator. Call once, before any allocation.
pub fn init_heap() {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_SPACE) as usize;
        HEAP_ALLOCATOR.lock().init(start, KERNEL_HEAP_SIZE);
    }
}
