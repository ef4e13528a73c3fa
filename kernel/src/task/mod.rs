//! Task (process) management module
//!
//! - [`queue`]: the stride run queue
//! - [`task`]: the PCB and the structures reported to user space
//! - [`manager`]: the process table and lifecycle transitions
//! - [`loader`]: the program-loading interface exec and spawn use

pub mod loader;
pub mod manager;
pub mod queue;
pub mod task;

pub use loader::{LoadedImage, ProgramLoader};
pub use manager::TaskManager;
pub use queue::{ProcessQueue, RunQueue};
pub use task::{ProcessControlBlock, TaskInfo, TaskStatus, TimeVal};
