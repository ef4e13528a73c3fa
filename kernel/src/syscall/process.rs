//! Process management syscalls

use crate::config::{CLOCK_FREQ, IDLE_PID, MAX_ARG_NUM, MAX_STR_LEN, MIN_PRIORITY, USER_STACK_ALIGN};
use crate::error::{SysError, SysResult};
use crate::kernel::Kernel;
use crate::mm::{read_str, read_value, write_value, MemorySet, PageTable};
use crate::task::{ProcessControlBlock, TaskInfo, TaskStatus, TimeVal};
use crate::trap::TrapContext;
use alloc::string::String;
use alloc::vec::Vec;
use core::mem::size_of;
use log::debug;

fn task(kernel: &Kernel, pid: usize) -> SysResult<&ProcessControlBlock> {
    kernel.tasks.get_task(pid).ok_or(SysError::NoSuchProcess)
}

fn task_mut(kernel: &mut Kernel, pid: usize) -> SysResult<&mut ProcessControlBlock> {
    kernel.tasks.get_task_mut(pid).ok_or(SysError::NoSuchProcess)
}

/// exit(code): does not return to the caller
pub fn sys_exit(kernel: &mut Kernel, pid: usize, exit_code: i32) {
    kernel.tasks.exit(pid, exit_code);
}

/// sched_yield()
pub fn sys_yield(kernel: &mut Kernel) -> SysResult<isize> {
    kernel.tasks.suspend_current();
    Ok(0)
}

/// gettimeofday(ts, tz); the timezone is ignored
pub fn sys_gettimeofday(kernel: &Kernel, pid: usize, ts: usize) -> SysResult<isize> {
    let cycles = kernel.clock().cycles();
    let time = TimeVal {
        sec: cycles / CLOCK_FREQ,
        usec: (cycles % CLOCK_FREQ) * 1_000_000 / CLOCK_FREQ,
    };
    write_value(task(kernel, pid)?.memory_set.page_table(), ts, &time)?;
    Ok(0)
}

/// getppid(); orphans report the idle pid
pub fn sys_getppid(kernel: &Kernel, pid: usize) -> SysResult<isize> {
    Ok(task(kernel, pid)?.parent.unwrap_or(IDLE_PID) as isize)
}

/// clone(): the child sees 0, the parent the child's pid
pub fn sys_fork(kernel: &mut Kernel, pid: usize) -> SysResult<isize> {
    let now = kernel.now_ms();
    let child = kernel.tasks.fork(pid, now)?;
    Ok(child as isize)
}

/// Collect a NULL-terminated array of string pointers.
fn read_argv(page_table: &PageTable, mut argv: usize) -> SysResult<Vec<String>> {
    let mut args = Vec::new();
    if argv == 0 {
        return Ok(args);
    }
    loop {
        let ptr: usize = read_value(page_table, argv)?;
        if ptr == 0 {
            return Ok(args);
        }
        if args.len() == MAX_ARG_NUM {
            return Err(SysError::InvalidArgument);
        }
        args.push(read_str(page_table, ptr, MAX_STR_LEN)?);
        argv = argv.checked_add(size_of::<usize>()).ok_or(SysError::BadAddress)?;
    }
}

/// Lay out `args` below `user_sp`: the pointer array on top, the strings
/// under it. Returns the new stack pointer and the array address.
fn push_args(memory_set: &mut MemorySet, user_sp: usize, args: &[String]) -> SysResult<(usize, usize)> {
    let word = size_of::<usize>();
    let argv_base = user_sp
        .checked_sub((args.len() + 1) * word)
        .ok_or(SysError::InvalidArgument)?;
    let mut sp = argv_base;
    for (i, arg) in args.iter().enumerate() {
        sp = sp.checked_sub(arg.len() + 1).ok_or(SysError::InvalidArgument)?;
        memory_set.copy_data(argv_base + i * word, &sp.to_ne_bytes())?;
        memory_set.copy_data(sp, arg.as_bytes())?;
        memory_set.copy_data(sp + arg.len(), &[0])?;
    }
    memory_set.copy_data(argv_base + args.len() * word, &0usize.to_ne_bytes())?;
    sp &= !(USER_STACK_ALIGN - 1);
    Ok((sp, argv_base))
}

/// execve(path, argv): on success `a0 = argc`, `a1 = argv`
pub fn sys_exec(kernel: &mut Kernel, pid: usize, path: usize, argv: usize) -> SysResult<isize> {
    let (name, args) = {
        let page_table = task(kernel, pid)?.memory_set.page_table();
        (read_str(page_table, path, MAX_STR_LEN)?, read_argv(page_table, argv)?)
    };
    let (mut memory_set, image) = kernel.load_image(&name)?;
    let (user_sp, argv_base) = push_args(&mut memory_set, image.user_sp, &args)?;

    let task = task_mut(kernel, pid)?;
    task.memory_set = memory_set;
    task.trap_cx = TrapContext::app_init_context(image.entry, user_sp, 0, 0, 0);
    task.trap_cx.set_arg1(argv_base);
    debug!("pid {}: exec {:?} with {} args", pid, name, args.len());
    Ok(args.len() as isize)
}

/// wait4(pid, status): `pid == -1` waits for any child
pub fn sys_waitpid(kernel: &mut Kernel, pid: usize, child: isize, status: usize) -> SysResult<isize> {
    let (reaped, exit_code) = kernel.tasks.wait(pid, child)?;
    if status != 0 {
        write_value(task(kernel, pid)?.memory_set.page_table(), status, &exit_code)?;
    }
    Ok(reaped as isize)
}

/// spawn(path): new child running program `path`
pub fn sys_spawn(kernel: &mut Kernel, pid: usize, path: usize) -> SysResult<isize> {
    let name = read_str(task(kernel, pid)?.memory_set.page_table(), path, MAX_STR_LEN)?;
    let child = kernel.spawn_process(&name, Some(pid))?;
    Ok(child as isize)
}

/// set_priority(prio): prio must be at least 2
pub fn sys_set_priority(kernel: &mut Kernel, pid: usize, prio: isize) -> SysResult<isize> {
    if prio < MIN_PRIORITY as isize {
        return Err(SysError::InvalidArgument);
    }
    task_mut(kernel, pid)?.priority = prio as u64;
    Ok(prio)
}

/// sbrk(delta): returns the previous break
pub fn sys_sbrk(kernel: &mut Kernel, pid: usize, delta: isize) -> SysResult<isize> {
    let old_brk = task_mut(kernel, pid)?.memory_set.change_program_brk(delta)?;
    Ok(old_brk as isize)
}

/// task_info(ti)
pub fn sys_task_info(kernel: &Kernel, pid: usize, ti: usize) -> SysResult<isize> {
    let now = kernel.now_ms();
    let task = task(kernel, pid)?;
    let info = TaskInfo {
        status: TaskStatus::Running as u32,
        syscall_times: task.syscall_times,
        time: now.saturating_sub(task.start_time) as i32,
    };
    write_value(task.memory_set.page_table(), ti, &info)?;
    Ok(0)
}
