//! Board services the syscall layer consumes

use crate::config::CLOCK_FREQ;

/// Byte console behind fds 0, 1 and 2
pub trait Console: Send + Sync {
    fn putchar(&self, c: u8);
    /// Blocking read of one byte
    fn getchar(&self) -> u8;

    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.putchar(b);
        }
    }
}

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Raw cycle counter running at [`CLOCK_FREQ`]
    fn cycles(&self) -> u64;

    fn millis(&self) -> u64 {
        self.cycles() / (CLOCK_FREQ / 1000)
    }

    fn micros(&self) -> u64 {
        self.cycles() / (CLOCK_FREQ / 1_000_000)
    }
}
