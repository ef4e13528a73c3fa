mod common;

use common::Harness;
use stride_kernel::config::PAGE_SIZE;
use stride_kernel::mm::{PROT_EXEC, PROT_READ, PROT_WRITE, VirtAddr};
use stride_kernel::syscall::{SYSCALL_MMAP, SYSCALL_MUNMAP};

const NO_FD: usize = usize::MAX;

fn max_page(h: &Harness, pid: usize) -> usize {
    h.kernel.tasks.get_task(pid).unwrap().memory_set.max_page()
}

#[test]
fn two_page_mapping_round_trip() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    let ret = h.syscall(SYSCALL_MMAP, &[0x10000, 8192, PROT_READ | PROT_WRITE, 0, NO_FD]);
    assert_eq!(ret, 0);
    assert!(max_page(&h, pid) >= 0x10000 / PAGE_SIZE + 2);
    assert_eq!(h.mapped_pages(pid), before + 2);

    h.write_user(pid, 0x11ff0, b"user data");
    assert_eq!(h.read_user(pid, 0x11ff0, 9), b"user data");

    assert_eq!(h.syscall(SYSCALL_MUNMAP, &[0x10000, 8192]), 0);
    assert_eq!(h.mapped_pages(pid), before);
}

#[test]
fn misaligned_start_fails() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x10001, 4096, PROT_READ, 0, NO_FD]), -1);
    assert_eq!(h.mapped_pages(pid), before);
}

#[test]
fn invalid_requests_never_partially_succeed() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    let free = h.frames.free_frames();
    for _ in 0..3 {
        assert_eq!(h.syscall(SYSCALL_MMAP, &[0x10000, 4096, 0, 0, NO_FD]), -1);
        assert_eq!(h.syscall(SYSCALL_MMAP, &[0x10000, 4096, 0xf, 0, NO_FD]), -1);
        assert_eq!(
            h.syscall(SYSCALL_MMAP, &[0x10000, (1 << 30) + 1, PROT_READ, 0, NO_FD]),
            -1
        );
        assert_eq!(h.syscall(SYSCALL_MMAP, &[usize::MAX & !0xfff, 8192, PROT_READ, 0, NO_FD]), -1);
    }
    assert_eq!(h.mapped_pages(pid), before);
    assert_eq!(h.frames.free_frames(), free);
}

#[test]
fn zero_length_mmap_is_a_successful_no_op() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x10000, 0, PROT_READ, 0, NO_FD]), 0);
    assert_eq!(h.mapped_pages(pid), before);
}

#[test]
fn mapping_over_the_program_image_fails_cleanly() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    // The code page sits at 0x1000; the page before it is free
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0, 2 * PAGE_SIZE, PROT_READ, 0, NO_FD]), -1);
    assert_eq!(h.mapped_pages(pid), before);
    let task = h.kernel.tasks.get_task(pid).unwrap();
    assert!(!task.memory_set.is_mapped(VirtAddr::new(0).page_number()));
}

#[test]
fn page_permissions_follow_port() {
    let (mut h, pid) = Harness::boot();
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x20000, 100, PROT_READ | PROT_EXEC, 0, NO_FD]), 0);
    let task = h.kernel.tasks.get_task(pid).unwrap();
    let pte = task
        .memory_set
        .page_table()
        .translate(VirtAddr::new(0x20000).page_number())
        .unwrap();
    assert!(pte.readable() && pte.executable() && pte.user());
    assert!(!pte.writable());
}

#[test]
fn munmap_with_a_hole_changes_nothing() {
    let (mut h, pid) = Harness::boot();
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x10000, PAGE_SIZE, PROT_READ, 0, NO_FD]), 0);
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x12000, PAGE_SIZE, PROT_READ, 0, NO_FD]), 0);
    let before = h.mapped_pages(pid);
    assert_eq!(h.syscall(SYSCALL_MUNMAP, &[0x10000, 3 * PAGE_SIZE]), -1);
    assert_eq!(h.mapped_pages(pid), before);
    assert_eq!(h.syscall(SYSCALL_MUNMAP, &[0x10001, PAGE_SIZE]), -1);
    assert_eq!(h.syscall(SYSCALL_MUNMAP, &[0x10000, 0]), 0);
    assert_eq!(h.syscall(SYSCALL_MUNMAP, &[0x12000, PAGE_SIZE]), 0);
    assert_eq!(h.mapped_pages(pid), before - 1);
}

#[test]
fn exhausted_memory_rolls_back() {
    let (mut h, pid) = Harness::boot();
    let before = h.mapped_pages(pid);
    let free = h.frames.free_frames();
    // More pages than the pool holds, but under the size limit
    let len = (free + 4) * PAGE_SIZE;
    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x40_0000, len, PROT_READ | PROT_WRITE, 0, NO_FD]), -1);
    assert_eq!(h.mapped_pages(pid), before);
    assert_eq!(max_page(&h, pid), 0);

    assert_eq!(h.syscall(SYSCALL_MMAP, &[0x40_0000, PAGE_SIZE, PROT_READ, 0, NO_FD]), 0);
}
