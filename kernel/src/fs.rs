//! File layer seen from the syscall side
//!
//! The kernel does not own a file system. It keeps per-process fd slots and
//! talks to whatever inode layer the board provides through [`FileSystem`]
//! and [`File`].

use crate::error::SysResult;
use crate::mm::Plain;
use alloc::sync::Arc;

/// Read/write access to one open inode
pub trait File: Send + Sync {
    fn readable(&self) -> bool;
    fn writable(&self) -> bool;
    /// Read into `buf` at the file cursor, returning the byte count.
    fn read(&self, buf: &mut [u8]) -> usize;
    /// Write `buf` at the file cursor, returning the byte count.
    fn write(&self, buf: &[u8]) -> usize;
    fn stat(&self) -> FileStat;
}

/// Inode facts reported by fstat
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub ino: u64,
    pub is_dir: bool,
    pub nlink: u32,
}

/// Path-level operations of the inode layer
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str, flags: OpenFlags) -> SysResult<Arc<dyn File>>;
    fn link(&self, old_path: &str, new_path: &str) -> SysResult<()>;
    fn unlink(&self, path: &str) -> SysResult<()>;
}

bitflags::bitflags! {
    /// openat flags
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 1 << 0;
        const RDWR = 1 << 1;
        const CREATE = 1 << 9;
        const TRUNC = 1 << 10;
    }
}

impl OpenFlags {
    /// (readable, writable) implied by the access mode bits
    pub fn read_write(&self) -> (bool, bool) {
        if self.contains(Self::WRONLY) {
            (false, true)
        } else if self.contains(Self::RDWR) {
            (true, true)
        } else {
            (true, false)
        }
    }
}

/// What an fd slot refers to
#[derive(Clone)]
pub enum FileDescriptor {
    /// Console: reads come from and writes go to the board console
    Stdio,
    Inode(Arc<dyn File>),
}

impl core::fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Stdio => write!(f, "Stdio"),
            Self::Inode(file) => write!(f, "Inode({})", file.stat().ino),
        }
    }
}

/// fstat result, laid out for user space
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pad: [u64; 7],
}

impl Stat {
    pub const DIR: u32 = 0o040000;
    pub const FILE: u32 = 0o100000;

    pub fn from_file_stat(st: FileStat) -> Self {
        Self {
            dev: 0,
            ino: st.ino,
            mode: if st.is_dir { Self::DIR } else { Self::FILE },
            nlink: st.nlink,
            pad: [0; 7],
        }
    }
}

unsafe impl Plain for Stat {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_modes() {
        assert_eq!(OpenFlags::RDONLY.read_write(), (true, false));
        assert_eq!(OpenFlags::WRONLY.read_write(), (false, true));
        assert_eq!((OpenFlags::RDWR | OpenFlags::CREATE).read_write(), (true, true));
    }

    #[test]
    fn stat_layout_and_mode() {
        assert_eq!(core::mem::size_of::<Stat>(), 80);
        let st = Stat::from_file_stat(FileStat { ino: 7, is_dir: false, nlink: 2 });
        assert_eq!(st.mode, Stat::FILE);
        assert_eq!((st.ino, st.nlink), (7, 2));
    }
}
