//! QEMU virt board image
//!
//! Boots, brings up the heap, the logger and the frame allocator, then
//! drives the syscall dispatcher through synthetic traps from a built-in
//! process and shuts down. Only built with the `board` feature.

#![no_std]
#![no_main]

extern crate alloc;

#[macro_use]
mod console;
mod board;
mod heap;
mod lang_items;
mod logging;
mod sbi;

use alloc::sync::Arc;
use core::arch::global_asm;
use log::{error, info};
use stride_kernel::config::{MEMORY_END, PAGE_SIZE};
use stride_kernel::mm::{read_value, BitmapFrameAllocator, FrameAllocator, PROT_READ, PROT_WRITE};
use stride_kernel::syscall::*;
use stride_kernel::task::RunQueue;
use stride_kernel::trap::ECALL_SIZE;
use stride_kernel::{Kernel, Services};

global_asm!(include_str!("entry.S"));

/// Kernel entry, jumped to from `entry.S`
#[no_mangle]
pub fn kernel_main(hartid: usize, dtb: usize) -> ! {
    clear_bss();
    heap::init_heap();
    logging::init();
    info!("stride kernel on hart {}, dtb at {:#x}", hartid, dtb);

    extern "C" {
        fn ekernel();
    }
    let frames = Arc::new(BitmapFrameAllocator::new(ekernel as usize, MEMORY_END));
    info!(
        "{} physical frames in [{:#x}, {:#x})",
        frames.total_frames(),
        ekernel as usize,
        MEMORY_END
    );
    let frames: Arc<dyn FrameAllocator> = frames;
    let services = Services {
        console: Arc::new(board::SbiConsole),
        clock: Arc::new(board::TimeClock),
        fs: Arc::new(board::NoFileSystem),
        loader: Arc::new(board::BuiltinLoader),
    };
    let mut kernel = Kernel::new(frames, services);

    let passed = run_queue_check() && self_check(&mut kernel);
    if passed {
        info!("self-check passed");
    } else {
        error!("self-check failed");
    }
    sbi::shutdown(!passed)
}

fn clear_bss() {
    extern "C" {
        fn sbss();
        fn ebss();
    }
    unsafe {
        core::slice::from_raw_parts_mut(sbss as usize as *mut u8, ebss as usize - sbss as usize)
            .fill(0);
    }
}

/// Issue one syscall on behalf of the current process, the way the trap
/// entry path would after an `ecall`.
fn ecall(kernel: &mut Kernel, id: usize, args: [usize; 6]) -> Dispatch {
    if let Some(cx) = kernel.current_trap_cx() {
        cx.set_syscall(id, args);
        cx.sepc += ECALL_SIZE;
    }
    kernel.handle_syscall()
}

fn expect(what: &str, got: Dispatch, want: Dispatch) -> bool {
    if got == want {
        info!("  {}: ok", what);
        true
    } else {
        error!("  {}: got {:?}, want {:?}", what, got, want);
        false
    }
}

fn run_queue_check() -> bool {
    let mut queue = RunQueue::<4>::new();
    for (pid, stride) in [(1, 30), (2, 10), (3, 20), (4, 10)] {
        queue.push(pid, stride);
    }
    let order = [queue.pop(), queue.pop(), queue.pop(), queue.pop(), queue.pop()];
    let ok = order == [Some(2), Some(4), Some(3), Some(1), None];
    if !ok {
        error!("  run queue order {:?}", order);
    }
    ok
}

fn self_check(kernel: &mut Kernel) -> bool {
    let pid = match kernel.spawn_initproc(board::SELF_CHECK) {
        Ok(pid) => pid,
        Err(err) => {
            error!("cannot start {}: {}", board::SELF_CHECK, err);
            return false;
        }
    };
    if kernel.run_next() != Some(pid) {
        return false;
    }

    const BUF: usize = 0x10000;
    const MSG: &[u8] = b"[selfcheck] hello through sys_write\n";
    let mut ok = true;

    ok &= expect(
        "mmap two pages",
        ecall(kernel, SYSCALL_MMAP, [BUF, 2 * PAGE_SIZE, PROT_READ | PROT_WRITE, 0, usize::MAX, 0]),
        Dispatch::Returned(0),
    );
    ok &= expect(
        "misaligned mmap",
        ecall(kernel, SYSCALL_MMAP, [BUF + 1, PAGE_SIZE, PROT_READ, 0, usize::MAX, 0]),
        Dispatch::Returned(-1),
    );
    if let Some(task) = kernel.tasks.get_task_mut(pid) {
        ok &= task.memory_set.copy_data(BUF, MSG).is_ok();
    }
    ok &= expect(
        "write to stdout",
        ecall(kernel, SYSCALL_WRITE, [1, BUF, MSG.len(), 0, 0, 0]),
        Dispatch::Returned(MSG.len() as isize),
    );
    ok &= expect(
        "unknown syscall",
        ecall(kernel, 999, [0; 6]),
        Dispatch::Returned(-1),
    );
    ok &= expect(
        "task_info",
        ecall(kernel, SYSCALL_TASK_INFO, [BUF + PAGE_SIZE, 0, 0, 0, 0, 0]),
        Dispatch::Returned(0),
    );
    if let Some(task) = kernel.tasks.get_task(pid) {
        let counter = BUF + PAGE_SIZE + 4 + 4 * SYSCALL_WRITE;
        let writes = read_value::<u32>(task.memory_set.page_table(), counter);
        ok &= writes == Ok(1);
    }
    ok &= expect(
        "munmap",
        ecall(kernel, SYSCALL_MUNMAP, [BUF, 2 * PAGE_SIZE, 0, 0, 0, 0]),
        Dispatch::Returned(0),
    );
    ok &= expect("exit", ecall(kernel, SYSCALL_EXIT, [0; 6]), Dispatch::Exited);
    ok && kernel.tasks.task_count() == 0
}
