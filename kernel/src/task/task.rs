//! Process Control Block
//!
//! Everything the kernel knows about one process. PCBs live in the
//! [`TaskManager`](super::TaskManager) table, keyed by pid.

use crate::config::{DEFAULT_PRIORITY, FD_BUFFER_SIZE, MAX_SYSCALL_NUM};
use crate::error::{SysError, SysResult};
use crate::fs::FileDescriptor;
use crate::mm::{MemorySet, Plain};
use crate::trap::TrapContext;
use alloc::vec;
use alloc::vec::Vec;

/// Task State
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    UnInit = 0,
    Ready = 1,
    Running = 2,
    Zombie = 3,
}

pub struct ProcessControlBlock {
    pub pid: usize,
    pub parent: Option<usize>,
    pub status: TaskStatus,
    pub priority: u64,
    /// Accumulated stride pass
    pub stride: u64,
    pub memory_set: MemorySet,
    pub trap_cx: TrapContext,
    pub syscall_times: [u32; MAX_SYSCALL_NUM],
    /// Clock reading (ms) at creation
    pub start_time: u64,
    pub fd_table: Vec<Option<FileDescriptor>>,
    pub exit_code: i32,
}

impl ProcessControlBlock {
    /// A fresh PCB owning `memory_set`, with stdio on fds 0..3.
    pub fn new(pid: usize, parent: Option<usize>, memory_set: MemorySet, start_time: u64) -> Self {
        let mut fd_table = vec![None; FD_BUFFER_SIZE];
        for slot in fd_table.iter_mut().take(3) {
            *slot = Some(FileDescriptor::Stdio);
        }
        Self {
            pid,
            parent,
            status: TaskStatus::UnInit,
            priority: DEFAULT_PRIORITY,
            stride: 0,
            memory_set,
            trap_cx: TrapContext::default(),
            syscall_times: [0; MAX_SYSCALL_NUM],
            start_time,
            fd_table,
            exit_code: 0,
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.status == TaskStatus::Zombie
    }

    pub fn get_user_token(&self) -> usize {
        self.memory_set.token()
    }

    /// Count one invocation of syscall `id`. Ids past the table are not
    /// counted; the caller decides what to do with them.
    pub fn record_syscall(&mut self, id: usize) -> bool {
        match self.syscall_times.get_mut(id) {
            Some(count) => {
                *count = count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn fd(&self, fd: usize) -> SysResult<&FileDescriptor> {
        self.fd_table
            .get(fd)
            .and_then(|slot| slot.as_ref())
            .ok_or(SysError::BadFileDescriptor)
    }

    /// Install `file` in the lowest free slot.
    pub fn alloc_fd(&mut self, file: FileDescriptor) -> SysResult<usize> {
        let fd = self
            .fd_table
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(SysError::TooManyFiles)?;
        self.fd_table[fd] = Some(file);
        Ok(fd)
    }

    pub fn close_fd(&mut self, fd: usize) -> SysResult<()> {
        self.fd_table
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .map(|_| ())
            .ok_or(SysError::BadFileDescriptor)
    }
}

impl core::fmt::Debug for ProcessControlBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessControlBlock")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("status", &self.status)
            .field("priority", &self.priority)
            .field("stride", &self.stride)
            .field("memory_set", &self.memory_set)
            .finish()
    }
}

/// task_info result, laid out for user space
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct TaskInfo {
    /// A [`TaskStatus`] discriminant
    pub status: u32,
    pub syscall_times: [u32; MAX_SYSCALL_NUM],
    /// Milliseconds since the process was created
    pub time: i32,
}

unsafe impl Plain for TaskInfo {}

impl Default for TaskInfo {
    fn default() -> Self {
        Self {
            status: TaskStatus::UnInit as u32,
            syscall_times: [0; MAX_SYSCALL_NUM],
            time: 0,
        }
    }
}

/// gettimeofday result
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeVal {
    pub sec: u64,
    pub usec: u64,
}

unsafe impl Plain for TimeVal {}
