//! Console output over the SBI legacy console

use crate::sbi;
use core::fmt::{self, Write};
use spin::Mutex;

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        sbi::console_putstr(s);
        Ok(())
    }
}

/// Keeps lines from interleaving
static STDOUT: Mutex<Stdout> = Mutex::new(Stdout);

pub fn print(args: fmt::Arguments) {
    let _ = STDOUT.lock().write_fmt(args);
}

/// Print to console
#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

/// Print to console with newline
#[macro_export]
macro_rules! println {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
    };
    () => {
        $crate::console::print(format_args!("\n"))
    }
}
