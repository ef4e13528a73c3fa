//! Memory Management Module
//!
//! - Physical frame allocation (consumed through [`FrameAllocator`])
//! - SV39 page tables
//! - Per-process address spaces with `mmap`/`munmap`/`sbrk`
//! - Checked copies between user and kernel memory

pub mod frame_allocator;
pub mod memory_layout;
pub mod memory_set;
pub mod page_table;
pub mod user_copy;

pub use frame_allocator::{BitmapFrameAllocator, FrameAllocator, FrameTracker};
pub use memory_layout::*;
pub use memory_set::{MapPermission, MemorySet, PROT_EXEC, PROT_READ, PROT_WRITE};
pub use page_table::{PTEFlags, PageTable, PageTableEntry};
pub use user_copy::{check_user_buffer, copy_in, copy_in_str, copy_out, read_str, read_value, write_value, Plain};
