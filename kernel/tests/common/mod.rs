//! Fakes for the board services and a small harness around [`Kernel`]
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use stride_kernel::config::{PAGE_SIZE, USER_STACK_SIZE};
use stride_kernel::fs::{File, FileStat, FileSystem, OpenFlags};
use stride_kernel::mm::{copy_in, copy_out, BitmapFrameAllocator, MapPermission, MemorySet};
use stride_kernel::platform::{Clock, Console};
use stride_kernel::syscall::Dispatch;
use stride_kernel::task::{LoadedImage, ProgramLoader};
use stride_kernel::trap::ECALL_SIZE;
use stride_kernel::{Kernel, Services, SysError, SysResult};

#[derive(Default)]
pub struct FakeConsole {
    pub output: Mutex<Vec<u8>>,
    pub input: Mutex<VecDeque<u8>>,
}

impl FakeConsole {
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }
}

impl Console for FakeConsole {
    fn putchar(&self, c: u8) {
        self.output.lock().unwrap().push(c);
    }

    fn getchar(&self) -> u8 {
        self.input.lock().unwrap().pop_front().unwrap_or(0)
    }
}

#[derive(Default)]
pub struct FakeClock {
    pub cycles: AtomicU64,
}

impl FakeClock {
    pub fn set(&self, cycles: u64) {
        self.cycles.store(cycles, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

struct Inode {
    ino: u64,
    data: Mutex<Vec<u8>>,
    nlink: Mutex<u32>,
}

struct OpenFile {
    inode: Arc<Inode>,
    offset: Mutex<usize>,
    readable: bool,
    writable: bool,
}

impl File for OpenFile {
    fn readable(&self) -> bool {
        self.readable
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let data = self.inode.data.lock().unwrap();
        let mut offset = self.offset.lock().unwrap();
        let n = buf.len().min(data.len().saturating_sub(*offset));
        buf[..n].copy_from_slice(&data[*offset..*offset + n]);
        *offset += n;
        n
    }

    fn write(&self, buf: &[u8]) -> usize {
        let mut data = self.inode.data.lock().unwrap();
        let mut offset = self.offset.lock().unwrap();
        let end = *offset + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[*offset..end].copy_from_slice(buf);
        *offset = end;
        buf.len()
    }

    fn stat(&self) -> FileStat {
        FileStat {
            ino: self.inode.ino,
            is_dir: false,
            nlink: *self.inode.nlink.lock().unwrap(),
        }
    }
}

/// Flat, single-directory file system kept in memory
#[derive(Default)]
pub struct MemFs {
    entries: Mutex<BTreeMap<String, Arc<Inode>>>,
    next_ino: AtomicU64,
}

impl FileSystem for MemFs {
    fn open(&self, path: &str, flags: OpenFlags) -> SysResult<Arc<dyn File>> {
        let mut entries = self.entries.lock().unwrap();
        let inode = match entries.get(path) {
            Some(inode) => {
                if flags.contains(OpenFlags::TRUNC) {
                    inode.data.lock().unwrap().clear();
                }
                inode.clone()
            }
            None if flags.contains(OpenFlags::CREATE) => {
                let inode = Arc::new(Inode {
                    ino: self.next_ino.fetch_add(1, Ordering::SeqCst) + 1,
                    data: Mutex::new(Vec::new()),
                    nlink: Mutex::new(1),
                });
                entries.insert(path.to_string(), inode.clone());
                inode
            }
            None => return Err(SysError::NotFound),
        };
        let (readable, writable) = flags.read_write();
        Ok(Arc::new(OpenFile {
            inode,
            offset: Mutex::new(0),
            readable,
            writable,
        }))
    }

    fn link(&self, old_path: &str, new_path: &str) -> SysResult<()> {
        let mut entries = self.entries.lock().unwrap();
        if old_path == new_path || entries.contains_key(new_path) {
            return Err(SysError::InvalidArgument);
        }
        let inode = entries.get(old_path).cloned().ok_or(SysError::NotFound)?;
        *inode.nlink.lock().unwrap() += 1;
        entries.insert(new_path.to_string(), inode);
        Ok(())
    }

    fn unlink(&self, path: &str) -> SysResult<()> {
        let inode = self
            .entries
            .lock()
            .unwrap()
            .remove(path)
            .ok_or(SysError::NotFound)?;
        *inode.nlink.lock().unwrap() -= 1;
        Ok(())
    }
}

pub const CODE_BASE: usize = 0x1000;
pub const STACK_BASE: usize = 0x3000;
pub const STACK_TOP: usize = STACK_BASE + USER_STACK_SIZE;

/// Maps a code page and a user stack for any name in its list
pub struct FakeLoader {
    pub programs: Vec<&'static str>,
}

impl ProgramLoader for FakeLoader {
    fn load(&self, name: &str, memory_set: &mut MemorySet) -> SysResult<LoadedImage> {
        if !self.programs.contains(&name) {
            return Err(SysError::NotFound);
        }
        memory_set.map_framed(
            CODE_BASE,
            PAGE_SIZE,
            MapPermission::R | MapPermission::X | MapPermission::U,
        )?;
        memory_set.copy_data(CODE_BASE, name.as_bytes())?;
        memory_set.map_framed(
            STACK_BASE,
            USER_STACK_SIZE,
            MapPermission::R | MapPermission::W | MapPermission::U,
        )?;
        Ok(LoadedImage {
            entry: CODE_BASE,
            user_sp: STACK_TOP,
            heap_bottom: STACK_TOP,
        })
    }
}

pub struct Harness {
    pub kernel: Kernel,
    pub frames: Arc<BitmapFrameAllocator>,
    pub console: Arc<FakeConsole>,
    pub clock: Arc<FakeClock>,
    pub fs: Arc<MemFs>,
}

impl Harness {
    pub fn new(frames: usize) -> Self {
        let pool = Arc::new(BitmapFrameAllocator::leak_pool(frames));
        let console = Arc::new(FakeConsole::default());
        let clock = Arc::new(FakeClock::default());
        let fs = Arc::new(MemFs::default());
        let services = Services {
            console: console.clone(),
            clock: clock.clone(),
            fs: fs.clone(),
            loader: Arc::new(FakeLoader {
                programs: vec!["initproc", "worker", "echo"],
            }),
        };
        Self {
            kernel: Kernel::new(pool.clone(), services),
            frames: pool,
            console,
            clock,
            fs,
        }
    }

    /// A harness with `initproc` loaded and running.
    pub fn boot() -> (Self, usize) {
        let mut h = Self::new(256);
        let pid = h.kernel.spawn_initproc("initproc").unwrap();
        assert_eq!(h.kernel.run_next(), Some(pid));
        (h, pid)
    }

    pub fn current(&self) -> usize {
        self.kernel.tasks.current_pid().expect("no current process")
    }

    /// Trap into the kernel from the current process with `ecall`.
    pub fn ecall(&mut self, id: usize, args: &[usize]) -> Dispatch {
        let mut regs = [0usize; 6];
        regs[..args.len()].copy_from_slice(args);
        let cx = self.kernel.current_trap_cx().expect("no current process");
        cx.set_syscall(id, regs);
        cx.sepc += ECALL_SIZE;
        self.kernel.handle_syscall()
    }

    /// Like [`ecall`](Self::ecall) but the call must return.
    pub fn syscall(&mut self, id: usize, args: &[usize]) -> isize {
        match self.ecall(id, args) {
            Dispatch::Returned(ret) => ret,
            other => panic!("syscall {} did not return: {:?}", id, other),
        }
    }

    pub fn write_user(&self, pid: usize, va: usize, bytes: &[u8]) {
        let task = self.kernel.tasks.get_task(pid).unwrap();
        copy_out(task.memory_set.page_table(), va, bytes).unwrap();
    }

    pub fn read_user(&self, pid: usize, va: usize, len: usize) -> Vec<u8> {
        let task = self.kernel.tasks.get_task(pid).unwrap();
        let mut buf = vec![0u8; len];
        copy_in(task.memory_set.page_table(), &mut buf, va).unwrap();
        buf
    }

    pub fn mapped_pages(&self, pid: usize) -> usize {
        self.kernel.tasks.get_task(pid).unwrap().memory_set.mapped_pages()
    }
}
