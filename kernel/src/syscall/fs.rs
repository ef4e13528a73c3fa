//! File and filesystem-related syscalls

use crate::config::MAX_STR_LEN;
use crate::error::{SysError, SysResult};
use crate::fs::{FileDescriptor, OpenFlags, Stat};
use crate::kernel::Kernel;
use crate::mm::{check_user_buffer, copy_in, copy_out, read_str, write_value, PTEFlags};
use crate::task::ProcessControlBlock;
use log::{debug, error};

fn task(kernel: &Kernel, pid: usize) -> SysResult<&ProcessControlBlock> {
    kernel.tasks.get_task(pid).ok_or(SysError::NoSuchProcess)
}

fn lookup_fd(task: &ProcessControlBlock, fd: usize) -> SysResult<FileDescriptor> {
    task.fd(fd).cloned().map_err(|err| {
        error!("pid {}: invalid fd {}", task.pid, fd);
        err
    })
}

/// write(fd, buf, len)
///
/// The whole buffer is checked before anything reaches the console or the
/// file, then moved in `MAX_STR_LEN` chunks.
pub fn sys_write(kernel: &Kernel, pid: usize, fd: usize, buf: usize, len: usize) -> SysResult<isize> {
    let task = task(kernel, pid)?;
    let page_table = task.memory_set.page_table();
    let desc = lookup_fd(task, fd)?;
    if let FileDescriptor::Inode(file) = &desc {
        if !file.writable() {
            return Err(SysError::BadFileDescriptor);
        }
    }
    check_user_buffer(page_table, buf, len, PTEFlags::R)?;
    let mut chunk = [0u8; MAX_STR_LEN];
    let mut written = 0;
    while written < len {
        let n = (len - written).min(MAX_STR_LEN);
        copy_in(page_table, &mut chunk[..n], buf + written)?;
        let done = match &desc {
            FileDescriptor::Stdio => {
                kernel.console().write_bytes(&chunk[..n]);
                n
            }
            FileDescriptor::Inode(file) => file.write(&chunk[..n]),
        };
        written += done;
        if done < n {
            break;
        }
    }
    Ok(written as isize)
}

/// read(fd, buf, len)
///
/// Console input is only consumed once the whole buffer is known to be
/// writable.
pub fn sys_read(kernel: &Kernel, pid: usize, fd: usize, buf: usize, len: usize) -> SysResult<isize> {
    let task = task(kernel, pid)?;
    let page_table = task.memory_set.page_table();
    let desc = lookup_fd(task, fd)?;
    if let FileDescriptor::Inode(file) = &desc {
        if !file.readable() {
            return Err(SysError::BadFileDescriptor);
        }
    }
    check_user_buffer(page_table, buf, len, PTEFlags::W)?;
    let mut chunk = [0u8; MAX_STR_LEN];
    let mut read = 0;
    while read < len {
        let want = (len - read).min(MAX_STR_LEN);
        let n = match &desc {
            FileDescriptor::Stdio => {
                for byte in chunk[..want].iter_mut() {
                    *byte = kernel.console().getchar();
                }
                want
            }
            FileDescriptor::Inode(file) => file.read(&mut chunk[..want]),
        };
        copy_out(page_table, buf + read, &chunk[..n])?;
        read += n;
        if n < want {
            break;
        }
    }
    Ok(read as isize)
}

/// openat(path, flags)
pub fn sys_openat(kernel: &mut Kernel, pid: usize, path: usize, flags: u32) -> SysResult<isize> {
    let path = read_str(task(kernel, pid)?.memory_set.page_table(), path, MAX_STR_LEN)?;
    let flags = OpenFlags::from_bits_truncate(flags);
    let file = kernel.fs().open(&path, flags)?;
    let task = kernel.tasks.get_task_mut(pid).ok_or(SysError::NoSuchProcess)?;
    let fd = task.alloc_fd(FileDescriptor::Inode(file))?;
    debug!("pid {}: opened {:?} as fd {}", pid, path, fd);
    Ok(fd as isize)
}

/// close(fd)
pub fn sys_close(kernel: &mut Kernel, pid: usize, fd: usize) -> SysResult<isize> {
    let task = kernel.tasks.get_task_mut(pid).ok_or(SysError::NoSuchProcess)?;
    task.close_fd(fd).map_err(|err| {
        error!("pid {}: invalid fd {}", pid, fd);
        err
    })?;
    Ok(0)
}

/// fstat(fd, st)
pub fn sys_fstat(kernel: &Kernel, pid: usize, fd: usize, st: usize) -> SysResult<isize> {
    let task = task(kernel, pid)?;
    let stat = match lookup_fd(task, fd)? {
        FileDescriptor::Inode(file) => Stat::from_file_stat(file.stat()),
        FileDescriptor::Stdio => return Err(SysError::BadFileDescriptor),
    };
    write_value(task.memory_set.page_table(), st, &stat)?;
    Ok(0)
}

/// linkat(olddirfd, oldpath, newdirfd, newpath, flags); only the paths matter
pub fn sys_linkat(kernel: &Kernel, pid: usize, old_path: usize, new_path: usize) -> SysResult<isize> {
    let page_table = task(kernel, pid)?.memory_set.page_table();
    let old_path = read_str(page_table, old_path, MAX_STR_LEN)?;
    let new_path = read_str(page_table, new_path, MAX_STR_LEN)?;
    kernel.fs().link(&old_path, &new_path)?;
    Ok(0)
}

/// unlinkat(dirfd, path, flags); only the path matters
pub fn sys_unlinkat(kernel: &Kernel, pid: usize, path: usize) -> SysResult<isize> {
    let path = read_str(task(kernel, pid)?.memory_set.page_table(), path, MAX_STR_LEN)?;
    kernel.fs().unlink(&path)?;
    Ok(0)
}
