//! Trap state shared with the (external) trap entry path
//!
//! Register save/restore lives outside this crate. Before handing a
//! `UserEnvCall` to [`crate::syscall::dispatch`], the entry path stores the
//! user registers into the current process's [`TrapContext`] and advances
//! `sepc` past the `ecall`.

pub mod context;

pub use context::TrapContext;

/// Width of the `ecall` instruction
pub const ECALL_SIZE: usize = 4;
