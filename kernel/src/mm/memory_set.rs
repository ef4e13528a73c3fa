//! Memory Set Management
//!
//! A [`MemorySet`] is one process's user address space: the page table, the
//! frames backing every user page, the `mmap` high-water mark and the heap
//! break. Mapping requests are all-or-nothing: a request that fails halfway
//! leaves the address space exactly as it found it.

use super::frame_allocator::{FrameAllocator, FrameTracker};
use super::memory_layout::*;
use super::page_table::{PTEFlags, PageTable};
use crate::config::{MAX_MMAP_BYTES, PAGE_SIZE, USER_SPACE_END};
use crate::error::{SysError, SysResult};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

bitflags::bitflags! {
    /// Leaf permissions, encoded exactly like the PTE bits
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct MapPermission: u8 {
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

/// Protection bits accepted by mmap
pub const PROT_READ: usize = 0x1;
pub const PROT_WRITE: usize = 0x2;
pub const PROT_EXEC: usize = 0x4;
const PROT_MASK: usize = PROT_READ | PROT_WRITE | PROT_EXEC;

impl MapPermission {
    /// Translate the 3-bit mmap `port` into a user-accessible permission.
    ///
    /// Bits outside read/write/execute, or none of them, are rejected.
    pub fn from_port(port: usize) -> SysResult<Self> {
        if port & !PROT_MASK != 0 || port & PROT_MASK == 0 {
            return Err(SysError::InvalidArgument);
        }
        Ok(Self::from_bits_truncate((port as u8) << 1) | Self::U)
    }

    fn pte_flags(self) -> PTEFlags {
        PTEFlags::from_bits_truncate(self.bits())
    }
}

/// Pages installed by one request, unmapped again unless committed
struct MapTransaction<'a> {
    set: &'a mut MemorySet,
    installed: Vec<VirtPageNum>,
}

impl<'a> MapTransaction<'a> {
    fn begin(set: &'a mut MemorySet) -> Self {
        Self {
            set,
            installed: Vec::new(),
        }
    }

    fn map_one(&mut self, vpn: VirtPageNum, perm: MapPermission) -> SysResult<()> {
        let frame =
            FrameTracker::alloc(self.set.page_table.allocator()).ok_or(SysError::OutOfMemory)?;
        // On failure the tracker drops here and the frame goes back
        self.set.page_table.map(vpn, frame.ppn, perm.pte_flags())?;
        self.set.data_frames.insert(vpn, frame);
        self.installed.push(vpn);
        Ok(())
    }

    fn commit(mut self) {
        self.installed.clear();
    }
}

impl Drop for MapTransaction<'_> {
    fn drop(&mut self) {
        if !self.installed.is_empty() {
            log::debug!("rolling back {} freshly mapped pages", self.installed.len());
        }
        for vpn in self.installed.drain(..) {
            let _ = self.set.page_table.unmap(vpn);
            self.set.data_frames.remove(&vpn);
        }
    }
}

/// Memory set
pub struct MemorySet {
    page_table: PageTable,
    data_frames: BTreeMap<VirtPageNum, FrameTracker>,
    /// Highest page index (exclusive) ever reached by mmap
    max_page: usize,
    heap_bottom: usize,
    program_brk: usize,
}

impl MemorySet {
    /// Create a new empty memory set
    pub fn new_bare(allocator: Arc<dyn FrameAllocator>) -> SysResult<Self> {
        Ok(Self {
            page_table: PageTable::new(allocator)?,
            data_frames: BTreeMap::new(),
            max_page: 0,
            heap_bottom: 0,
            program_brk: 0,
        })
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// Get page table token (satp value)
    pub fn token(&self) -> usize {
        self.page_table.token()
    }

    /// Translate a virtual address to physical address
    pub fn translate(&self, va: usize) -> Option<usize> {
        self.page_table
            .translate_va(VirtAddr::new(va))
            .map(|pa| pa.as_usize())
    }

    pub fn is_mapped(&self, vpn: VirtPageNum) -> bool {
        self.page_table.translate(vpn).is_some()
    }

    /// Number of user pages currently backed by a frame
    pub fn mapped_pages(&self) -> usize {
        self.data_frames.len()
    }

    pub fn max_page(&self) -> usize {
        self.max_page
    }

    pub fn heap_bottom(&self) -> usize {
        self.heap_bottom
    }

    pub fn program_brk(&self) -> usize {
        self.program_brk
    }

    /// Place an empty heap at `bottom`; the loader calls this once.
    pub fn init_heap(&mut self, bottom: usize) {
        self.heap_bottom = bottom;
        self.program_brk = bottom;
    }

    /// Map every page touching `[start, start + len)` with fresh frames.
    pub fn map_framed(&mut self, start: usize, len: usize, perm: MapPermission) -> SysResult<()> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= USER_SPACE_END)
            .ok_or(SysError::BadAddress)?;
        let first = VirtAddr::new(align_down(start)).page_number();
        let last = VirtAddr::new(align_up(end)).page_number();
        let mut txn = MapTransaction::begin(self);
        for vpn in first.0..last.0 {
            txn.map_one(VirtPageNum::new(vpn), perm)?;
        }
        txn.commit();
        Ok(())
    }

    /// Write `data` at `va` regardless of page permissions (image loading).
    pub fn copy_data(&mut self, va: usize, data: &[u8]) -> SysResult<()> {
        let mut va = va;
        let mut rest = data;
        while !rest.is_empty() {
            let addr = VirtAddr::new(va);
            let frame = self
                .data_frames
                .get(&addr.page_number())
                .ok_or(SysError::NotMapped)?;
            let offset = addr.page_offset();
            let n = (PAGE_SIZE - offset).min(rest.len());
            let page = unsafe { frame.ppn.bytes_mut() };
            page[offset..offset + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            va += n;
        }
        Ok(())
    }

    /// Shared mmap/munmap precondition checks.
    ///
    /// `Ok(None)` means a zero-length request, which is a no-op.
    fn check_range(start: usize, len: usize) -> SysResult<Option<(VirtPageNum, usize)>> {
        if start % PAGE_SIZE != 0 {
            return Err(SysError::InvalidArgument);
        }
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_MMAP_BYTES {
            return Err(SysError::InvalidArgument);
        }
        let pages = pages_for(len);
        start
            .checked_add(pages * PAGE_SIZE)
            .filter(|&end| end <= USER_SPACE_END)
            .ok_or(SysError::BadAddress)?;
        Ok(Some((VirtAddr::new(start).page_number(), pages)))
    }

    /// Back `[start, start + len)` with fresh zeroed frames.
    ///
    /// `_flags` and `_fd` are accepted for ABI compatibility and ignored.
    pub fn mmap(
        &mut self,
        start: usize,
        len: usize,
        port: usize,
        _flags: usize,
        _fd: usize,
    ) -> SysResult<()> {
        let Some((first, pages)) = Self::check_range(start, len)? else {
            return Ok(());
        };
        let perm = MapPermission::from_port(port)?;

        let mut txn = MapTransaction::begin(self);
        for i in 0..pages {
            txn.map_one(first + i, perm)?;
        }
        txn.commit();

        self.max_page = self.max_page.max(first.0 + pages);
        Ok(())
    }

    /// Remove `[start, start + len)`, which must be mapped in its entirety.
    pub fn munmap(&mut self, start: usize, len: usize) -> SysResult<()> {
        let Some((first, pages)) = Self::check_range(start, len)? else {
            return Ok(());
        };
        if pages > self.max_page {
            return Err(SysError::InvalidArgument);
        }
        if (0..pages).any(|i| !self.is_mapped(first + i)) {
            return Err(SysError::NotMapped);
        }
        for i in 0..pages {
            self.unmap_one(first + i);
        }
        Ok(())
    }

    fn unmap_one(&mut self, vpn: VirtPageNum) {
        if self.page_table.unmap(vpn).is_ok() {
            self.data_frames.remove(&vpn);
        }
    }

    /// Move the heap break by `delta` bytes and return the old break.
    pub fn change_program_brk(&mut self, delta: isize) -> SysResult<usize> {
        let old_brk = self.program_brk;
        let new_brk = old_brk
            .checked_add_signed(delta)
            .filter(|&brk| brk >= self.heap_bottom && brk <= USER_SPACE_END)
            .ok_or(SysError::InvalidArgument)?;

        let old_top = align_up(old_brk) / PAGE_SIZE;
        let new_top = align_up(new_brk) / PAGE_SIZE;
        if new_top > old_top {
            let mut txn = MapTransaction::begin(self);
            for vpn in old_top..new_top {
                txn.map_one(VirtPageNum::new(vpn), MapPermission::R | MapPermission::W | MapPermission::U)?;
            }
            txn.commit();
        } else {
            for vpn in new_top..old_top {
                self.unmap_one(VirtPageNum::new(vpn));
            }
        }
        self.program_brk = new_brk;
        Ok(old_brk)
    }

    /// Deep copy for fork: same layout, same permissions, private frames.
    pub fn try_clone(&self) -> SysResult<Self> {
        let mut child = Self::new_bare(Arc::clone(self.page_table.allocator()))?;
        for (&vpn, frame) in self.data_frames.iter() {
            let pte = self.page_table.translate(vpn).ok_or(SysError::NotMapped)?;
            let perm = MapPermission::from_bits_truncate(pte.flags().bits());
            let copy = FrameTracker::alloc(child.page_table.allocator()).ok_or(SysError::OutOfMemory)?;
            unsafe { copy.ppn.bytes_mut().copy_from_slice(frame.ppn.bytes_mut()) };
            child.page_table.map(vpn, copy.ppn, perm.pte_flags())?;
            child.data_frames.insert(vpn, copy);
        }
        child.max_page = self.max_page;
        child.heap_bottom = self.heap_bottom;
        child.program_brk = self.program_brk;
        Ok(child)
    }

    /// Drop every user page, keeping only the empty table structure.
    pub fn recycle_data_pages(&mut self) {
        let vpns: Vec<VirtPageNum> = self.data_frames.keys().copied().collect();
        for vpn in vpns {
            self.unmap_one(vpn);
        }
    }
}

impl core::fmt::Debug for MemorySet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemorySet")
            .field("page_table", &self.page_table)
            .field("mapped_pages", &self.data_frames.len())
            .field("max_page", &self.max_page)
            .field("program_brk", &self.program_brk)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::BitmapFrameAllocator;

    fn space(frames: usize) -> (Arc<BitmapFrameAllocator>, MemorySet) {
        let pool = Arc::new(BitmapFrameAllocator::leak_pool(frames));
        let set = MemorySet::new_bare(pool.clone()).unwrap();
        (pool, set)
    }

    fn vpn(va: usize) -> VirtPageNum {
        VirtAddr::new(va).page_number()
    }

    #[test]
    fn mmap_two_pages_then_munmap() {
        let (_pool, mut set) = space(16);
        set.mmap(0x10000, 8192, PROT_READ | PROT_WRITE, 0, usize::MAX)
            .unwrap();
        assert!(set.max_page() >= 0x10000 / PAGE_SIZE + 2);
        assert!(set.is_mapped(vpn(0x10000)) && set.is_mapped(vpn(0x11000)));
        let pte = set.page_table().translate(vpn(0x11000)).unwrap();
        assert!(pte.readable() && pte.writable() && pte.user() && !pte.executable());

        set.munmap(0x10000, 8192).unwrap();
        assert_eq!(set.mapped_pages(), 0);
    }

    #[test]
    fn round_trip_returns_every_data_frame() {
        let (pool, mut set) = space(32);
        set.mmap(0x40_0000, PAGE_SIZE, PROT_READ, 0, 0).unwrap();
        set.munmap(0x40_0000, PAGE_SIZE).unwrap();
        let baseline = pool.free_frames();

        set.mmap(0x40_0000, 5 * PAGE_SIZE, PROT_READ | PROT_EXEC, 0, 0)
            .unwrap();
        assert_eq!(pool.free_frames(), baseline - 5);
        set.munmap(0x40_0000, 5 * PAGE_SIZE).unwrap();
        assert_eq!(pool.free_frames(), baseline);
        assert!((0..5).all(|i| !set.is_mapped(vpn(0x40_0000) + i)));
    }

    #[test]
    fn rejects_bad_requests_without_side_effects() {
        let (pool, mut set) = space(16);
        let free = pool.free_frames();
        for _ in 0..2 {
            assert!(set.mmap(0x10001, 4096, PROT_READ, 0, 0).is_err());
            assert!(set.mmap(0x10000, 4096, 0, 0, 0).is_err());
            assert!(set.mmap(0x10000, 4096, 0x8 | PROT_READ, 0, 0).is_err());
            assert!(set.mmap(0x10000, MAX_MMAP_BYTES + 1, PROT_READ, 0, 0).is_err());
            assert!(set.mmap(USER_SPACE_END - PAGE_SIZE, 2 * PAGE_SIZE, PROT_READ, 0, 0).is_err());
        }
        assert_eq!(set.mapped_pages(), 0);
        assert_eq!(set.max_page(), 0);
        assert_eq!(pool.free_frames(), free);
    }

    #[test]
    fn zero_length_is_a_no_op() {
        let (_pool, mut set) = space(4);
        assert_eq!(set.mmap(0x10000, 0, 0, 0, 0), Ok(()));
        assert_eq!(set.munmap(0x10000, 0), Ok(()));
        assert_eq!(set.mapped_pages(), 0);
    }

    #[test]
    fn partial_allocation_failure_rolls_back() {
        // root + two directory levels + two data frames
        let (pool, mut set) = space(5);
        let err = set.mmap(0x10000, 4 * PAGE_SIZE, PROT_READ | PROT_WRITE, 0, 0);
        assert_eq!(err, Err(SysError::OutOfMemory));
        assert_eq!(set.mapped_pages(), 0);
        assert!((0..4).all(|i| !set.is_mapped(vpn(0x10000) + i)));
        assert_eq!(set.max_page(), 0);
        assert_eq!(pool.free_frames(), 2);

        set.mmap(0x10000, 2 * PAGE_SIZE, PROT_READ, 0, 0).unwrap();
        assert_eq!(set.mapped_pages(), 2);
    }

    #[test]
    fn collision_with_existing_mapping_rolls_back() {
        let (_pool, mut set) = space(16);
        set.mmap(0x11000, PAGE_SIZE, PROT_READ, 0, 0).unwrap();
        let err = set.mmap(0x10000, 2 * PAGE_SIZE, PROT_READ, 0, 0);
        assert_eq!(err, Err(SysError::AlreadyMapped));
        assert!(!set.is_mapped(vpn(0x10000)));
        assert!(set.is_mapped(vpn(0x11000)));
    }

    #[test]
    fn munmap_is_all_or_nothing() {
        let (_pool, mut set) = space(16);
        set.mmap(0x10000, PAGE_SIZE, PROT_READ, 0, 0).unwrap();
        set.mmap(0x12000, PAGE_SIZE, PROT_READ, 0, 0).unwrap();

        assert_eq!(set.munmap(0x10000, 3 * PAGE_SIZE), Err(SysError::NotMapped));
        assert!(set.is_mapped(vpn(0x10000)));
        assert!(set.is_mapped(vpn(0x12000)));
        assert_eq!(set.mapped_pages(), 2);
    }

    #[test]
    fn munmap_bounded_by_high_water_mark() {
        let (_pool, mut set) = space(16);
        set.mmap(0, PAGE_SIZE, PROT_READ, 0, 0).unwrap();
        assert_eq!(set.max_page(), 1);
        assert_eq!(set.munmap(0, 2 * PAGE_SIZE), Err(SysError::InvalidArgument));
        assert!(set.munmap(0x10001, PAGE_SIZE).is_err());
        set.munmap(0, 100).unwrap();
    }

    #[test]
    fn program_brk_grows_and_shrinks() {
        let (_pool, mut set) = space(16);
        set.init_heap(0x20000);
        assert_eq!(set.change_program_brk(100), Ok(0x20000));
        assert!(set.is_mapped(vpn(0x20000)));
        assert_eq!(set.change_program_brk(PAGE_SIZE as isize), Ok(0x20064));
        assert!(set.is_mapped(vpn(0x21000)));
        assert_eq!(set.program_brk(), 0x21064);

        assert_eq!(set.change_program_brk(-(PAGE_SIZE as isize)), Ok(0x21064));
        assert!(!set.is_mapped(vpn(0x21000)));
        assert!(set.is_mapped(vpn(0x20000)));
        assert!(set.change_program_brk(-0x1000).is_err());
        assert_eq!(set.program_brk(), 0x20064);
    }

    #[test]
    fn clone_copies_contents_privately() {
        let (_pool, mut set) = space(32);
        set.mmap(0x10000, PAGE_SIZE, PROT_READ | PROT_WRITE, 0, 0).unwrap();
        set.copy_data(0x10ffe, b"ab").unwrap();
        let mut child = set.try_clone().unwrap();
        child.copy_data(0x10ffe, b"zz").unwrap();

        let parent_pa = set.translate(0x10ffe).unwrap();
        let child_pa = child.translate(0x10ffe).unwrap();
        assert_ne!(parent_pa, child_pa);
        assert_eq!(unsafe { *(parent_pa as *const u8) }, b'a');
        assert_eq!(unsafe { *(child_pa as *const u8) }, b'z');
        assert_eq!(child.max_page(), set.max_page());
    }
}
