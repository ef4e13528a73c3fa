//! Address and page-number types
//!
//! Physical memory is reachable through identity addressing: the kernel
//! dereferences `ppn << PAGE_SIZE_BITS` directly.

use super::page_table::PageTableEntry;
use crate::config::{PAGE_SIZE, PAGE_SIZE_BITS};

/// Get page offset from address
#[inline]
pub const fn page_offset(addr: usize) -> usize {
    addr & (PAGE_SIZE - 1)
}

/// Align address up to page size
#[inline]
pub const fn align_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Align address down to page size
#[inline]
pub const fn align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Number of whole pages needed to hold `len` bytes
#[inline]
pub const fn pages_for(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}

/// Physical address type
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
    pub fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn page_number(&self) -> PhysPageNum {
        PhysPageNum(self.0 >> PAGE_SIZE_BITS)
    }

    pub fn page_offset(&self) -> usize {
        page_offset(self.0)
    }
}

/// Physical page number type
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct PhysPageNum(pub usize);

impl PhysPageNum {
    pub fn new(ppn: usize) -> Self {
        Self(ppn)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn addr(&self) -> PhysAddr {
        PhysAddr(self.0 << PAGE_SIZE_BITS)
    }

    pub fn as_ptr<T>(&self) -> *mut T {
        (self.0 << PAGE_SIZE_BITS) as *mut T
    }

    /// The whole frame as bytes.
    ///
    /// # Safety
    /// The frame must be owned by the caller (allocated and not freed) and
    /// no other live reference may alias it.
    pub unsafe fn bytes_mut(&self) -> &'static mut [u8] {
        core::slice::from_raw_parts_mut(self.as_ptr::<u8>(), PAGE_SIZE)
    }

    /// The frame viewed as one level of an SV39 table.
    ///
    /// # Safety
    /// Same as [`PhysPageNum::bytes_mut`], and the frame must hold a page table.
    pub unsafe fn pte_array(&self) -> &'static mut [PageTableEntry; 512] {
        &mut *self.as_ptr::<[PageTableEntry; 512]>()
    }
}

impl From<usize> for PhysPageNum {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Virtual address type
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    pub fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn page_number(&self) -> VirtPageNum {
        VirtPageNum(self.0 >> PAGE_SIZE_BITS)
    }

    pub fn page_offset(&self) -> usize {
        page_offset(self.0)
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

/// Virtual page number type
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct VirtPageNum(pub usize);

impl VirtPageNum {
    pub fn new(vpn: usize) -> Self {
        Self(vpn)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn addr(&self) -> VirtAddr {
        VirtAddr(self.0 << PAGE_SIZE_BITS)
    }

    /// Get indexes for 3-level page table (SV39)
    pub fn indexes(&self) -> [usize; 3] {
        let vpn = self.0;
        [
            (vpn >> 18) & 0x1FF, // Level 2
            (vpn >> 9) & 0x1FF,  // Level 1
            vpn & 0x1FF,         // Level 0
        ]
    }
}

impl core::ops::Add<usize> for VirtPageNum {
    type Output = Self;
    fn add(self, rhs: usize) -> Self {
        Self(self.0 + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up() {
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
        assert_eq!(align_up(0x10001), 0x11000);
        assert_eq!(align_down(0x10fff), 0x10000);
    }

    #[test]
    fn sv39_indexes() {
        let vpn = VirtAddr::new(0x4020_3000).page_number();
        assert_eq!(vpn.indexes(), [1, 1, 3]);
    }
}
