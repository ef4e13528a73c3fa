//! System call handling module
//!
//! Every `ecall` goes through [`dispatch`] in four steps:
//!
//! 1. decode the id (`a7`) and arguments (`a0..a5`) from the caller's
//!    saved trap frame,
//! 2. count the call in the caller's per-id table, whatever happens next,
//! 3. run the handler for the id,
//! 4. write the result into `a0`, with every error collapsed to `-1`.
//!
//! Handlers get the kernel and the caller's pid and look the PCB up
//! themselves, so nothing holds a process reference across fork, yield or
//! exit.

mod fs;
mod memory;
mod process;

use crate::error::{SysError, SysResult};
use crate::kernel::Kernel;
use crate::trap::ECALL_SIZE;
use log::{error, trace, warn};

pub const SYSCALL_UNLINKAT: usize = 35;
pub const SYSCALL_LINKAT: usize = 37;
pub const SYSCALL_OPENAT: usize = 56;
pub const SYSCALL_CLOSE: usize = 57;
pub const SYSCALL_READ: usize = 63;
pub const SYSCALL_WRITE: usize = 64;
pub const SYSCALL_FSTAT: usize = 80;
pub const SYSCALL_EXIT: usize = 93;
pub const SYSCALL_YIELD: usize = 124;
pub const SYSCALL_SET_PRIORITY: usize = 140;
pub const SYSCALL_GETTIMEOFDAY: usize = 169;
pub const SYSCALL_GETPID: usize = 172;
pub const SYSCALL_GETPPID: usize = 173;
pub const SYSCALL_SBRK: usize = 214;
pub const SYSCALL_MUNMAP: usize = 215;
pub const SYSCALL_CLONE: usize = 220;
pub const SYSCALL_EXEC: usize = 221;
pub const SYSCALL_MMAP: usize = 222;
pub const SYSCALL_WAIT: usize = 260;
pub const SYSCALL_SPAWN: usize = 400;
pub const SYSCALL_TASK_INFO: usize = 410;

/// What happened to the trapped process
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// `a0` now holds this value
    Returned(isize),
    /// The caller is gone; nothing was written back
    Exited,
    /// The caller yielded and will re-issue the same `ecall` when next run
    Blocked,
    /// No process was running
    NoCurrent,
}

/// Service the current process's pending syscall.
pub fn dispatch(kernel: &mut Kernel) -> Dispatch {
    // Decode
    let Some(pid) = kernel.tasks.current_pid() else {
        warn!("syscall trap with no current process");
        return Dispatch::NoCurrent;
    };
    let Some(task) = kernel.tasks.get_task_mut(pid) else {
        warn!("current pid {} has no PCB", pid);
        return Dispatch::NoCurrent;
    };
    let id = task.trap_cx.syscall_id();
    let args = task.trap_cx.syscall_args();

    // Account
    if !task.record_syscall(id) {
        warn!("pid {}: syscall id {} is outside the counter table", pid, id);
    }
    trace!("pid {} syscall {} args = {:x?}", pid, id, args);

    // Dispatch
    if id == SYSCALL_EXIT {
        process::sys_exit(kernel, pid, args[0] as i32);
        return Dispatch::Exited;
    }
    let result = syscall(kernel, pid, id, args);

    // WriteBack
    let Some(task) = kernel.tasks.get_task_mut(pid) else {
        return Dispatch::Exited;
    };
    match result {
        Err(SysError::WouldBlock) => {
            task.trap_cx.sepc = task.trap_cx.sepc.wrapping_sub(ECALL_SIZE);
            kernel.tasks.suspend_current();
            trace!("pid {} syscall {} blocked", pid, id);
            Dispatch::Blocked
        }
        result => {
            let ret = match result {
                Ok(value) => value,
                Err(err) => {
                    trace!("pid {} syscall {} failed: {}", pid, id, err);
                    err.code()
                }
            };
            task.trap_cx.set_return(ret);
            trace!("pid {} syscall {} ret {}", pid, id, ret);
            Dispatch::Returned(ret)
        }
    }
}

fn syscall(kernel: &mut Kernel, pid: usize, id: usize, args: [usize; 6]) -> SysResult<isize> {
    match id {
        SYSCALL_WRITE => fs::sys_write(kernel, pid, args[0], args[1], args[2]),
        SYSCALL_READ => fs::sys_read(kernel, pid, args[0], args[1], args[2]),
        SYSCALL_OPENAT => fs::sys_openat(kernel, pid, args[0], args[1] as u32),
        SYSCALL_CLOSE => fs::sys_close(kernel, pid, args[0]),
        SYSCALL_FSTAT => fs::sys_fstat(kernel, pid, args[0], args[1]),
        SYSCALL_LINKAT => fs::sys_linkat(kernel, pid, args[1], args[3]),
        SYSCALL_UNLINKAT => fs::sys_unlinkat(kernel, pid, args[1]),
        SYSCALL_YIELD => process::sys_yield(kernel),
        SYSCALL_GETTIMEOFDAY => process::sys_gettimeofday(kernel, pid, args[0]),
        SYSCALL_GETPID => Ok(pid as isize),
        SYSCALL_GETPPID => process::sys_getppid(kernel, pid),
        SYSCALL_CLONE => process::sys_fork(kernel, pid),
        SYSCALL_EXEC => process::sys_exec(kernel, pid, args[0], args[1]),
        SYSCALL_WAIT => process::sys_waitpid(kernel, pid, args[0] as isize, args[1]),
        SYSCALL_SPAWN => process::sys_spawn(kernel, pid, args[0]),
        SYSCALL_SET_PRIORITY => process::sys_set_priority(kernel, pid, args[0] as isize),
        SYSCALL_SBRK => process::sys_sbrk(kernel, pid, args[0] as isize),
        SYSCALL_TASK_INFO => process::sys_task_info(kernel, pid, args[0]),
        SYSCALL_MMAP => memory::sys_mmap(kernel, pid, args[0], args[1], args[2], args[3], args[4]),
        SYSCALL_MUNMAP => memory::sys_munmap(kernel, pid, args[0], args[1]),
        _ => {
            error!("pid {}: unknown syscall {}", pid, id);
            Err(SysError::Unsupported(id))
        }
    }
}
