//! Task Manager
//!
//! Owns every PCB and the stride run queue. All lifecycle transitions
//! (allocation, scheduling, yield, exit, reaping, fork) go through here so
//! the table and the queue never disagree.

use super::queue::ProcessQueue;
use super::task::{ProcessControlBlock, TaskStatus};
use crate::config::{BIG_STRIDE, NPROC};
use crate::error::{SysError, SysResult};
use crate::mm::MemorySet;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use log::{debug, warn};

pub struct TaskManager {
    tasks: BTreeMap<usize, ProcessControlBlock>,
    ready_queue: ProcessQueue,
    current_task: Option<usize>,
    next_pid: usize,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            ready_queue: ProcessQueue::new(),
            current_task: None,
            next_pid: 1,
        }
    }

    /// Create a PCB around `memory_set` and return its pid. The process is
    /// not runnable until [`add_runnable`](Self::add_runnable).
    pub fn alloc_process(
        &mut self,
        parent: Option<usize>,
        memory_set: MemorySet,
        start_time: u64,
    ) -> SysResult<usize> {
        if self.tasks.len() >= NPROC {
            warn!("process table full ({} entries)", NPROC);
            return Err(SysError::ProcessLimit);
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.tasks
            .insert(pid, ProcessControlBlock::new(pid, parent, memory_set, start_time));
        Ok(pid)
    }

    /// Mark `pid` ready and queue it with its current stride.
    pub fn add_runnable(&mut self, pid: usize) {
        let Some(task) = self.tasks.get_mut(&pid) else {
            warn!("add_runnable: no process {}", pid);
            return;
        };
        task.status = TaskStatus::Ready;
        self.ready_queue.push(pid, task.stride);
    }

    /// Pick the runnable process with the smallest stride and make it current.
    ///
    /// # Panics
    /// If the queue hands out a pid that is not in the table.
    pub fn schedule(&mut self) -> Option<usize> {
        let pid = self.ready_queue.pop()?;
        let task = match self.tasks.get_mut(&pid) {
            Some(task) => task,
            None => panic!("scheduled pid {} has no PCB", pid),
        };
        task.status = TaskStatus::Running;
        task.stride += BIG_STRIDE / task.priority;
        self.current_task = Some(pid);
        Some(pid)
    }

    pub fn current_pid(&self) -> Option<usize> {
        self.current_task
    }

    pub fn get_task(&self, pid: usize) -> Option<&ProcessControlBlock> {
        self.tasks.get(&pid)
    }

    pub fn get_task_mut(&mut self, pid: usize) -> Option<&mut ProcessControlBlock> {
        self.tasks.get_mut(&pid)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready_queue.len()
    }

    /// Give up the CPU: the current process goes back on the run queue.
    pub fn suspend_current(&mut self) {
        if let Some(pid) = self.current_task.take() {
            if self.tasks.get(&pid).map(|t| t.status) == Some(TaskStatus::Running) {
                self.add_runnable(pid);
            }
        }
    }

    /// Terminate `pid`: release its pages and files right away, hand its
    /// children to nobody and leave a zombie for the parent to reap.
    pub fn exit(&mut self, pid: usize, exit_code: i32) {
        let Some(task) = self.tasks.get_mut(&pid) else {
            return;
        };
        task.status = TaskStatus::Zombie;
        task.exit_code = exit_code;
        task.memory_set.recycle_data_pages();
        task.fd_table.iter_mut().for_each(|slot| *slot = None);
        let has_parent = task.parent.is_some();

        let mut orphaned_zombies = Vec::new();
        for child in self.tasks.values_mut().filter(|t| t.parent == Some(pid)) {
            child.parent = None;
            if child.is_zombie() {
                orphaned_zombies.push(child.pid);
            }
        }
        for zombie in orphaned_zombies {
            debug!("reaping orphan {}", zombie);
            self.tasks.remove(&zombie);
        }
        if !has_parent {
            debug!("reaping parentless process {}", pid);
            self.tasks.remove(&pid);
        }
        if self.current_task == Some(pid) {
            self.current_task = None;
        }
        debug!("process {} exited with code {}", pid, exit_code);
    }

    /// Reap an exited child of `parent`. `pid == -1` matches any child.
    ///
    /// Returns the reaped pid and its exit code, [`SysError::NoChild`] when
    /// nothing matches, or [`SysError::WouldBlock`] when matching children
    /// are still alive.
    pub fn wait(&mut self, parent: usize, pid: isize) -> SysResult<(usize, i32)> {
        let matches = |t: &&ProcessControlBlock| {
            t.parent == Some(parent) && (pid == -1 || t.pid as isize == pid)
        };
        if !self.tasks.values().any(|t| matches(&t)) {
            return Err(SysError::NoChild);
        }
        let zombie = self
            .tasks
            .values()
            .filter(matches)
            .find(|t| t.is_zombie())
            .map(|t| t.pid)
            .ok_or(SysError::WouldBlock)?;
        let child = self.tasks.remove(&zombie).ok_or(SysError::NoChild)?;
        debug!("process {} reaped child {}", parent, zombie);
        Ok((zombie, child.exit_code))
    }

    /// Duplicate `parent` into a new runnable process and return its pid.
    pub fn fork(&mut self, parent: usize, start_time: u64) -> SysResult<usize> {
        if self.tasks.len() >= NPROC {
            return Err(SysError::ProcessLimit);
        }
        let source = self.tasks.get(&parent).ok_or(SysError::NoSuchProcess)?;
        let memory_set = source.memory_set.try_clone()?;
        let priority = source.priority;
        let fd_table = source.fd_table.clone();
        let mut trap_cx = source.trap_cx;
        trap_cx.set_return(0);

        let pid = self.alloc_process(Some(parent), memory_set, start_time)?;
        if let Some(child) = self.tasks.get_mut(&pid) {
            child.priority = priority;
            child.fd_table = fd_table;
            child.trap_cx = trap_cx;
        }
        self.add_runnable(pid);
        debug!("process {} forked child {}", parent, pid);
        Ok(pid)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
