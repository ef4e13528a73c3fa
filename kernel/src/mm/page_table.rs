//! Page Table Management
//!
//! Implements SV39 page table for RISC-V 64-bit systems.
//! SV39 uses 3-level page tables with 39-bit virtual addresses.
//!
//! A [`PageTable`] owns the frames of its directory levels (root included)
//! and releases them on drop. Leaf frames belong to whoever mapped them.

use super::frame_allocator::{FrameAllocator, FrameTracker};
use super::memory_layout::*;
use crate::error::{SysError, SysResult};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt::{self, Debug, Formatter};

bitflags! {
    /// Page Table Entry (PTE) flags
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct PTEFlags: u8 {
        /// Valid flag
        const V = 1 << 0;
        /// Readable flag
        const R = 1 << 1;
        /// Writable flag
        const W = 1 << 2;
        /// Executable flag
        const X = 1 << 3;
        /// User accessible flag
        const U = 1 << 4;
        /// Global mapping flag
        const G = 1 << 5;
        /// Accessed flag (set by hardware)
        const A = 1 << 6;
        /// Dirty flag (set by hardware)
        const D = 1 << 7;
    }
}

/// Page Table Entry
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct PageTableEntry {
    bits: usize,
}

impl PageTableEntry {
    /// Create a PTE from physical page number and flags
    pub fn new(ppn: PhysPageNum, flags: PTEFlags) -> Self {
        Self {
            bits: (ppn.as_usize() << 10) | flags.bits() as usize,
        }
    }

    /// Create a new invalid PTE
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Get physical page number from PTE
    pub fn ppn(&self) -> PhysPageNum {
        PhysPageNum::new((self.bits >> 10) & ((1usize << 44) - 1))
    }

    /// Get flags from PTE
    pub fn flags(&self) -> PTEFlags {
        PTEFlags::from_bits_truncate(self.bits as u8)
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(PTEFlags::V)
    }

    /// R, W or X set: this entry maps a page rather than the next level
    pub fn is_leaf(&self) -> bool {
        self.flags().intersects(PTEFlags::R | PTEFlags::W | PTEFlags::X)
    }

    pub fn readable(&self) -> bool {
        self.flags().contains(PTEFlags::R)
    }

    pub fn writable(&self) -> bool {
        self.flags().contains(PTEFlags::W)
    }

    pub fn executable(&self) -> bool {
        self.flags().contains(PTEFlags::X)
    }

    pub fn user(&self) -> bool {
        self.flags().contains(PTEFlags::U)
    }
}

impl Debug for PageTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PTE")
            .field("ppn", &self.ppn())
            .field("flags", &self.flags())
            .finish()
    }
}

/// A three-level SV39 table rooted at `root_ppn`
pub struct PageTable {
    root_ppn: PhysPageNum,
    /// Root and intermediate table frames
    frames: Vec<FrameTracker>,
    allocator: Arc<dyn FrameAllocator>,
}

impl PageTable {
    /// Create a new empty page table, allocating its root frame.
    pub fn new(allocator: Arc<dyn FrameAllocator>) -> SysResult<Self> {
        let root = FrameTracker::alloc(&allocator).ok_or(SysError::OutOfMemory)?;
        Ok(Self {
            root_ppn: root.ppn,
            frames: vec![root],
            allocator,
        })
    }

    pub fn allocator(&self) -> &Arc<dyn FrameAllocator> {
        &self.allocator
    }

    /// Number of frames spent on the table structure itself
    pub fn table_frames(&self) -> usize {
        self.frames.len()
    }

    /// Walk to the leaf slot for `vpn`, creating missing directory levels.
    fn find_pte_create(&mut self, vpn: VirtPageNum) -> SysResult<&mut PageTableEntry> {
        let indexes = vpn.indexes();
        let mut ppn = self.root_ppn;
        for (level, &index) in indexes.iter().enumerate() {
            let pte = unsafe { &mut ppn.pte_array()[index] };
            if level == 2 {
                return Ok(pte);
            }
            if !pte.is_valid() {
                let frame = FrameTracker::alloc(&self.allocator).ok_or(SysError::OutOfMemory)?;
                *pte = PageTableEntry::new(frame.ppn, PTEFlags::V);
                self.frames.push(frame);
            } else if pte.is_leaf() {
                // Huge mapping in the way; user mappings never create one
                return Err(SysError::AlreadyMapped);
            }
            ppn = pte.ppn();
        }
        unreachable!()
    }

    /// Walk to the leaf slot for `vpn` without creating anything.
    fn find_pte(&self, vpn: VirtPageNum) -> Option<&mut PageTableEntry> {
        let indexes = vpn.indexes();
        let mut ppn = self.root_ppn;
        for (level, &index) in indexes.iter().enumerate() {
            let pte = unsafe { &mut ppn.pte_array()[index] };
            if level == 2 {
                return Some(pte);
            }
            if !pte.is_valid() || pte.is_leaf() {
                return None;
            }
            ppn = pte.ppn();
        }
        None
    }

    /// Map a virtual page to a physical page
    pub fn map(&mut self, vpn: VirtPageNum, ppn: PhysPageNum, flags: PTEFlags) -> SysResult<()> {
        let pte = self.find_pte_create(vpn)?;
        if pte.is_valid() {
            return Err(SysError::AlreadyMapped);
        }
        *pte = PageTableEntry::new(ppn, flags | PTEFlags::V);
        Ok(())
    }

    /// Unmap a virtual page, handing back the frame it pointed at
    pub fn unmap(&mut self, vpn: VirtPageNum) -> SysResult<PhysPageNum> {
        match self.find_pte(vpn) {
            Some(pte) if pte.is_valid() => {
                let ppn = pte.ppn();
                *pte = PageTableEntry::empty();
                Ok(ppn)
            }
            _ => Err(SysError::NotMapped),
        }
    }

    /// Look up the valid leaf entry for `vpn`
    pub fn translate(&self, vpn: VirtPageNum) -> Option<PageTableEntry> {
        self.find_pte(vpn).filter(|pte| pte.is_valid()).map(|pte| *pte)
    }

    /// Translate a full virtual address
    pub fn translate_va(&self, va: VirtAddr) -> Option<PhysAddr> {
        self.translate(va.page_number())
            .map(|pte| PhysAddr::new(pte.ppn().addr().as_usize() + va.page_offset()))
    }

    /// satp value selecting this table in SV39 mode
    pub fn token(&self) -> usize {
        8usize << 60 | self.root_ppn.as_usize()
    }
}

impl Debug for PageTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PageTable(root={:#x})", self.root_ppn.as_usize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::BitmapFrameAllocator;

    fn pool(frames: usize) -> (Arc<BitmapFrameAllocator>, Arc<dyn FrameAllocator>) {
        let pool = Arc::new(BitmapFrameAllocator::leak_pool(frames));
        let dyn_pool: Arc<dyn FrameAllocator> = pool.clone();
        (pool, dyn_pool)
    }

    #[test]
    fn map_translate_unmap() {
        let (_pool, frames) = pool(8);
        let mut table = PageTable::new(frames.clone()).unwrap();
        let vpn = VirtPageNum::new(0x10);
        let data = frames.alloc().unwrap();

        table.map(vpn, data, PTEFlags::R | PTEFlags::U).unwrap();
        let pte = table.translate(vpn).unwrap();
        assert_eq!(pte.ppn(), data);
        assert!(pte.readable() && pte.user() && !pte.writable());
        assert_eq!(
            table.translate_va(VirtAddr::new(0x10_123)),
            Some(PhysAddr::new(data.addr().as_usize() + 0x123))
        );

        assert_eq!(table.map(vpn, data, PTEFlags::R), Err(SysError::AlreadyMapped));
        assert_eq!(table.unmap(vpn), Ok(data));
        assert!(table.translate(vpn).is_none());
        assert_eq!(table.unmap(vpn), Err(SysError::NotMapped));
        frames.dealloc(data);
    }

    #[test]
    fn directory_frames_are_released_on_drop() {
        let (pool, frames) = pool(8);
        let mut table = PageTable::new(frames).unwrap();
        table
            .map(VirtPageNum::new(0), PhysPageNum::new(0x80000), PTEFlags::R)
            .unwrap();
        assert_eq!(table.table_frames(), 3);
        assert_eq!(pool.free_frames(), 5);
        drop(table);
        assert_eq!(pool.free_frames(), 8);
    }

    #[test]
    fn directory_allocation_failure_is_reported() {
        let (_pool, frames) = pool(2);
        let mut table = PageTable::new(frames).unwrap();
        let err = table.map(VirtPageNum::new(7), PhysPageNum::new(0x80000), PTEFlags::R);
        assert_eq!(err, Err(SysError::OutOfMemory));
        assert!(table.translate(VirtPageNum::new(7)).is_none());
    }
}
