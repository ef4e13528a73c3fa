//! Board services for QEMU virt
//!
//! The console and the clock go through SBI. There is no disk driver and no
//! ELF parser in this image, so the file system is empty and the loader only
//! knows the built-in self-check program.

use crate::sbi;
use alloc::sync::Arc;
use stride_kernel::config::{PAGE_SIZE, USER_STACK_SIZE};
use stride_kernel::fs::{File, FileSystem, OpenFlags};
use stride_kernel::mm::{MapPermission, MemorySet};
use stride_kernel::platform::{Clock, Console};
use stride_kernel::task::{LoadedImage, ProgramLoader};
use stride_kernel::{SysError, SysResult};

pub struct SbiConsole;

impl Console for SbiConsole {
    fn putchar(&self, c: u8) {
        sbi::console_putchar(c);
    }

    fn getchar(&self) -> u8 {
        loop {
            if let Some(c) = sbi::console_getchar() {
                return c;
            }
        }
    }
}

pub struct TimeClock;

impl Clock for TimeClock {
    fn cycles(&self) -> u64 {
        sbi::get_time()
    }
}

pub struct NoFileSystem;

impl FileSystem for NoFileSystem {
    fn open(&self, _path: &str, _flags: OpenFlags) -> SysResult<Arc<dyn File>> {
        Err(SysError::NotFound)
    }

    fn link(&self, _old_path: &str, _new_path: &str) -> SysResult<()> {
        Err(SysError::NotFound)
    }

    fn unlink(&self, _path: &str) -> SysResult<()> {
        Err(SysError::NotFound)
    }
}

/// Name of the only program this image can load
pub const SELF_CHECK: &str = "selfcheck";

const CODE_BASE: usize = 0x1000;
/// One unmapped guard page sits between code and stack
const STACK_BASE: usize = CODE_BASE + 2 * PAGE_SIZE;

/// Loads the self-check process: one code page with `wfi; j .` and a stack.
pub struct BuiltinLoader;

impl ProgramLoader for BuiltinLoader {
    fn load(&self, name: &str, memory_set: &mut MemorySet) -> SysResult<LoadedImage> {
        if name != SELF_CHECK {
            return Err(SysError::NotFound);
        }
        let code: [u32; 2] = [0x1050_0073, 0x0000_006f];
        memory_set.map_framed(
            CODE_BASE,
            PAGE_SIZE,
            MapPermission::R | MapPermission::X | MapPermission::U,
        )?;
        for (i, insn) in code.iter().enumerate() {
            memory_set.copy_data(CODE_BASE + 4 * i, &insn.to_le_bytes())?;
        }
        memory_set.map_framed(
            STACK_BASE,
            USER_STACK_SIZE,
            MapPermission::R | MapPermission::W | MapPermission::U,
        )?;
        let stack_top = STACK_BASE + USER_STACK_SIZE;
        Ok(LoadedImage {
            entry: CODE_BASE,
            user_sp: stack_top,
            heap_bottom: stack_top,
        })
    }
}
