//! SBI helpers using `sbi-rt` (RustSBI prototyper friendly)

use sbi_rt as sbi;

/// Print a single character to console (legacy)
#[allow(deprecated)]
pub fn console_putchar(ch: u8) {
    let _ = sbi::legacy::console_putchar(ch as usize);
}

/// Print a string to console
pub fn console_putstr(s: &str) {
    for ch in s.bytes() {
        console_putchar(ch);
    }
}

/// Get a character from console (non-blocking)
#[allow(deprecated)]
pub fn console_getchar() -> Option<u8> {
    let ch = sbi::legacy::console_getchar();
    if ch == usize::MAX {
        None
    } else {
        Some(ch as u8)
    }
}

/// Current `time` CSR value, ticking at `CLOCK_FREQ`
pub fn get_time() -> u64 {
    riscv::register::time::read() as u64
}

/// Shutdown the system
pub fn shutdown(failure: bool) -> ! {
    let _ = if failure {
        sbi::system_reset(sbi::Shutdown, sbi::SystemFailure)
    } else {
        sbi::system_reset(sbi::Shutdown, sbi::NoReason)
    };

    // SRST unavailable; the legacy call does not return
    #[allow(deprecated)]
    sbi::legacy::shutdown()
}
