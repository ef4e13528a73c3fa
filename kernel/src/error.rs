//! Kernel error taxonomy
//!
//! Handlers keep failures distinguishable internally; the syscall ABI
//! collapses every variant to `-1` at write-back time.

use core::fmt::{self, Display, Formatter};

/// Why a kernel operation on behalf of a process failed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SysError {
    /// Malformed request: misaligned address, bad length, illegal bits
    InvalidArgument,
    /// A user pointer is unmapped, lacks permission or overflows
    BadAddress,
    /// fd out of range or empty slot
    BadFileDescriptor,
    /// The frame allocator ran dry
    OutOfMemory,
    /// Tried to install a mapping over a valid entry
    AlreadyMapped,
    /// A page that must be mapped is not
    NotMapped,
    /// No process with that pid
    NoSuchProcess,
    /// wait() found no matching child
    NoChild,
    /// Process table is full
    ProcessLimit,
    /// Path lookup failed
    NotFound,
    /// No free fd slot
    TooManyFiles,
    /// The caller must sleep and retry the syscall
    WouldBlock,
    /// Syscall id with no handler
    Unsupported(usize),
}

impl SysError {
    /// Value written into `a0` for any failure.
    pub const fn code(&self) -> isize {
        -1
    }
}

impl Display for SysError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadAddress => write!(f, "bad user address"),
            Self::BadFileDescriptor => write!(f, "bad file descriptor"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::AlreadyMapped => write!(f, "page already mapped"),
            Self::NotMapped => write!(f, "page not mapped"),
            Self::NoSuchProcess => write!(f, "no such process"),
            Self::NoChild => write!(f, "no child process"),
            Self::ProcessLimit => write!(f, "process table full"),
            Self::NotFound => write!(f, "no such file"),
            Self::TooManyFiles => write!(f, "too many open files"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::Unsupported(id) => write!(f, "unsupported syscall {}", id),
        }
    }
}

pub type SysResult<T> = Result<T, SysError>;
