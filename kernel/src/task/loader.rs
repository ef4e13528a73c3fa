//! Program loading collaborator
//!
//! Parsing executables is not this crate's job. A [`ProgramLoader`] fills a
//! fresh [`MemorySet`] with the named program and reports where it starts.

use crate::error::SysResult;
use crate::mm::MemorySet;

/// Where a freshly loaded image begins execution
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: usize,
    /// Top of the mapped user stack
    pub user_sp: usize,
    /// First byte past the image; the heap starts here
    pub heap_bottom: usize,
}

pub trait ProgramLoader: Send + Sync {
    /// Map program `name` into `memory_set`.
    ///
    /// Returns [`NotFound`](crate::error::SysError::NotFound) for an unknown
    /// name. On error the caller discards `memory_set`.
    fn load(&self, name: &str, memory_set: &mut MemorySet) -> SysResult<LoadedImage>;
}
