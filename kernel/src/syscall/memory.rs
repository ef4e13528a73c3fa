//! Memory mapping system calls

use crate::error::{SysError, SysResult};
use crate::kernel::Kernel;
use log::warn;

/// mmap(start, len, port, flags, fd)
///
/// Anonymous, fixed-address mappings only: `flags` and `fd` are ignored.
pub fn sys_mmap(
    kernel: &mut Kernel,
    pid: usize,
    start: usize,
    len: usize,
    port: usize,
    flags: usize,
    fd: usize,
) -> SysResult<isize> {
    let task = kernel.tasks.get_task_mut(pid).ok_or(SysError::NoSuchProcess)?;
    task.memory_set
        .mmap(start, len, port, flags, fd)
        .map_err(|err| {
            warn!("pid {}: mmap({:#x}, {:#x}, {:#x}) rejected: {}", pid, start, len, port, err);
            err
        })?;
    Ok(0)
}

/// munmap(start, len)
pub fn sys_munmap(kernel: &mut Kernel, pid: usize, start: usize, len: usize) -> SysResult<isize> {
    let task = kernel.tasks.get_task_mut(pid).ok_or(SysError::NoSuchProcess)?;
    task.memory_set.munmap(start, len).map_err(|err| {
        warn!("pid {}: munmap({:#x}, {:#x}) rejected: {}", pid, start, len, err);
        err
    })?;
    Ok(0)
}
