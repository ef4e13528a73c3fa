//! Process and memory core of a single-CPU RISC-V (SV39) teaching kernel
//!
//! - [`task`]: stride-scheduled run queue, PCBs and the process table
//! - [`mm`]: frames, page tables, per-process address spaces and the
//!   checked user/kernel copy routines
//! - [`syscall`]: the `ecall` dispatcher and its handlers
//! - [`kernel`]: the context object handlers operate on
//!
//! The library is `no_std`; host builds of the test suite link `std` so the
//! same code runs under `cargo test` with heap memory standing in for RAM.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod platform;
pub mod syscall;
pub mod task;
pub mod trap;

pub use error::{SysError, SysResult};
pub use kernel::{Kernel, Services};
