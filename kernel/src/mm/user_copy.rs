//! Moving bytes across the user/kernel boundary
//!
//! Every user pointer is resolved through the owning process's page table
//! before it is touched. A page that is unmapped, not user-accessible or
//! lacking the needed R/W bit turns into [`SysError::BadAddress`]; the
//! kernel never dereferences an unchecked user address.

use super::memory_layout::*;
use super::page_table::{PTEFlags, PageTable};
use crate::config::USER_SPACE_END;
use crate::error::{SysError, SysResult};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;

/// Types that may be copied to or from user memory byte for byte.
///
/// # Safety
/// Implementors must be `#[repr(C)]` without padding, and every bit
/// pattern must be a valid value.
pub unsafe trait Plain: Copy {}

unsafe impl Plain for u8 {}
unsafe impl Plain for i32 {}
unsafe impl Plain for u32 {}
unsafe impl Plain for usize {}

/// The rest of the page holding `va`, checked for user access and `need`.
fn user_page(page_table: &PageTable, va: usize, need: PTEFlags) -> SysResult<&'static mut [u8]> {
    if va >= USER_SPACE_END {
        return Err(SysError::BadAddress);
    }
    let addr = VirtAddr::new(va);
    let pte = page_table
        .translate(addr.page_number())
        .filter(|pte| pte.flags().contains(need | PTEFlags::U))
        .ok_or(SysError::BadAddress)?;
    let page = unsafe { pte.ppn().bytes_mut() };
    Ok(&mut page[addr.page_offset()..])
}

/// Check that every page of `[va, va + len)` is user-accessible with
/// `need`, without allocating or touching the bytes.
pub fn check_user_buffer(page_table: &PageTable, va: usize, len: usize, need: PTEFlags) -> SysResult<()> {
    let end = va
        .checked_add(len)
        .filter(|&end| end <= USER_SPACE_END)
        .ok_or(SysError::BadAddress)?;
    let mut current = va;
    while current < end {
        let page = user_page(page_table, current, need)?;
        current += page.len();
    }
    Ok(())
}

/// Resolve `[va, va + len)` into per-page kernel slices, failing if any
/// touched page is inaccessible. Nothing is read or written here.
fn translated_byte_buffer(
    page_table: &PageTable,
    va: usize,
    len: usize,
    need: PTEFlags,
) -> SysResult<Vec<&'static mut [u8]>> {
    check_user_buffer(page_table, va, len, need)?;
    let mut buffers = Vec::new();
    let mut current = va;
    let mut remaining = len;
    while remaining > 0 {
        let page = user_page(page_table, current, need)?;
        let n = page.len().min(remaining);
        buffers.push(&mut page[..n]);
        current += n;
        remaining -= n;
    }
    Ok(buffers)
}

/// Fill `dst` from user memory at `src_va`.
pub fn copy_in(page_table: &PageTable, dst: &mut [u8], src_va: usize) -> SysResult<()> {
    let mut filled = 0;
    for chunk in translated_byte_buffer(page_table, src_va, dst.len(), PTEFlags::R)? {
        dst[filled..filled + chunk.len()].copy_from_slice(chunk);
        filled += chunk.len();
    }
    Ok(())
}

/// Write `src` into user memory at `dst_va`. All pages are checked before
/// the first byte is written.
pub fn copy_out(page_table: &PageTable, dst_va: usize, src: &[u8]) -> SysResult<()> {
    let mut consumed = 0;
    for chunk in translated_byte_buffer(page_table, dst_va, src.len(), PTEFlags::W)? {
        let n = chunk.len();
        chunk.copy_from_slice(&src[consumed..consumed + n]);
        consumed += n;
    }
    Ok(())
}

/// Copy a NUL-terminated user string into `dst`.
///
/// Stops at the first NUL or after `dst.len() - 1` bytes, always leaves a
/// terminator in `dst`, and returns the length without it. Longer strings
/// are truncated rather than rejected.
pub fn copy_in_str(page_table: &PageTable, dst: &mut [u8], src_va: usize) -> SysResult<usize> {
    let Some(limit) = dst.len().checked_sub(1) else {
        return Ok(0);
    };
    let mut copied = 0;
    let mut va = src_va;
    while copied < limit {
        let page = user_page(page_table, va, PTEFlags::R)?;
        for &byte in page.iter().take(limit - copied) {
            if byte == 0 {
                dst[copied] = 0;
                return Ok(copied);
            }
            dst[copied] = byte;
            copied += 1;
        }
        va += page.len();
    }
    dst[copied] = 0;
    Ok(copied)
}

/// Read a user string of at most `max_len - 1` bytes as UTF-8.
pub fn read_str(page_table: &PageTable, src_va: usize, max_len: usize) -> SysResult<String> {
    let mut buf = vec![0u8; max_len];
    let len = copy_in_str(page_table, &mut buf, src_va)?;
    buf.truncate(len);
    String::from_utf8(buf).map_err(|_| SysError::InvalidArgument)
}

/// Read one value of type `T` from user memory.
pub fn read_value<T: Plain + Default>(page_table: &PageTable, src_va: usize) -> SysResult<T> {
    let mut value = T::default();
    let bytes = unsafe {
        core::slice::from_raw_parts_mut(&mut value as *mut T as *mut u8, size_of::<T>())
    };
    copy_in(page_table, bytes, src_va)?;
    Ok(value)
}

/// Write one value of type `T` into user memory.
pub fn write_value<T: Plain>(page_table: &PageTable, dst_va: usize, value: &T) -> SysResult<()> {
    let bytes =
        unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) };
    copy_out(page_table, dst_va, bytes)
}
