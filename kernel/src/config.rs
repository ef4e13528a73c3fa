//! Kernel configuration constants

/// Page size (4KB)
pub const PAGE_SIZE: usize = 0x1000;

/// Page size bits
pub const PAGE_SIZE_BITS: usize = 12;

/// User stack size (8KB)
pub const USER_STACK_SIZE: usize = 4096 * 2;

/// User stack pointer alignment required by the RISC-V calling convention
pub const USER_STACK_ALIGN: usize = 16;

/// Kernel heap size (8MB)
pub const KERNEL_HEAP_SIZE: usize = 0x80_0000;

/// Physical memory end (128MB for QEMU virt)
pub const MEMORY_END: usize = 0x8800_0000;

/// Exclusive upper bound of user virtual addresses (lower half of SV39)
pub const USER_SPACE_END: usize = 1 << 38;

/// Max number of live processes, which is also the run queue capacity
pub const NPROC: usize = 512;

/// Size of the per-process syscall counter table
pub const MAX_SYSCALL_NUM: usize = 500;

/// Largest region a single mmap/munmap may cover (1GB)
pub const MAX_MMAP_BYTES: usize = 1 << 30;

/// Longest string (including the terminator) copied in from user space
pub const MAX_STR_LEN: usize = 200;

/// Max number of exec arguments
pub const MAX_ARG_NUM: usize = 32;

/// Slots in each process's open-file table
pub const FD_BUFFER_SIZE: usize = 16;

/// Stride pass numerator; a process advances by `BIG_STRIDE / priority`
pub const BIG_STRIDE: u64 = 65536;

/// Priority given to every new process
pub const DEFAULT_PRIORITY: u64 = 16;

/// Smallest priority `set_priority` accepts
pub const MIN_PRIORITY: u64 = 2;

/// Pid reported by getppid for orphans
pub const IDLE_PID: usize = 0;

/// Clock frequency (10MHz for QEMU)
pub const CLOCK_FREQ: u64 = 10_000_000;
