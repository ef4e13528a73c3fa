//! The kernel context
//!
//! One [`Kernel`] value holds the process table, the frame allocator and
//! the board services. Syscall handlers receive it explicitly together
//! with the pid they act for; there is no global "current process".

use crate::error::SysResult;
use crate::fs::FileSystem;
use crate::mm::{FrameAllocator, MemorySet};
use crate::platform::{Clock, Console};
use crate::syscall::{self, Dispatch};
use crate::task::{LoadedImage, ProgramLoader, TaskManager};
use crate::trap::TrapContext;
use alloc::sync::Arc;
use log::debug;

/// Collaborators provided by the board (or by tests)
#[derive(Clone)]
pub struct Services {
    pub console: Arc<dyn Console>,
    pub clock: Arc<dyn Clock>,
    pub fs: Arc<dyn FileSystem>,
    pub loader: Arc<dyn ProgramLoader>,
}

pub struct Kernel {
    pub tasks: TaskManager,
    frames: Arc<dyn FrameAllocator>,
    services: Services,
}

impl Kernel {
    pub fn new(frames: Arc<dyn FrameAllocator>, services: Services) -> Self {
        Self {
            tasks: TaskManager::new(),
            frames,
            services,
        }
    }

    pub fn frames(&self) -> &Arc<dyn FrameAllocator> {
        &self.frames
    }

    pub fn console(&self) -> &dyn Console {
        self.services.console.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.services.clock.as_ref()
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.services.fs.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.services.clock.millis()
    }

    /// Build a fresh address space holding program `name`.
    pub fn load_image(&self, name: &str) -> SysResult<(MemorySet, LoadedImage)> {
        let mut memory_set = MemorySet::new_bare(Arc::clone(&self.frames))?;
        let image = self.services.loader.load(name, &mut memory_set)?;
        memory_set.init_heap(image.heap_bottom);
        Ok((memory_set, image))
    }

    /// Load `name` into a new runnable process and return its pid.
    pub fn spawn_process(&mut self, name: &str, parent: Option<usize>) -> SysResult<usize> {
        let (memory_set, image) = self.load_image(name)?;
        let start_time = self.now_ms();
        let pid = self.tasks.alloc_process(parent, memory_set, start_time)?;
        if let Some(task) = self.tasks.get_task_mut(pid) {
            task.trap_cx = TrapContext::app_init_context(image.entry, image.user_sp, 0, 0, 0);
        }
        self.tasks.add_runnable(pid);
        debug!("loaded {:?} as process {} (entry {:#x})", name, pid, image.entry);
        Ok(pid)
    }

    /// Start the first user process.
    pub fn spawn_initproc(&mut self, name: &str) -> SysResult<usize> {
        self.spawn_process(name, None)
    }

    /// Pick the next process to run and make it current.
    pub fn run_next(&mut self) -> Option<usize> {
        self.tasks.schedule()
    }

    /// Saved registers of the current process
    pub fn current_trap_cx(&mut self) -> Option<&mut TrapContext> {
        let pid = self.tasks.current_pid()?;
        self.tasks.get_task_mut(pid).map(|task| &mut task.trap_cx)
    }

    /// Service the `ecall` the current process just trapped with.
    pub fn handle_syscall(&mut self) -> Dispatch {
        syscall::dispatch(self)
    }
}
