//! Trap context for user-kernel transitions

/// Trap context saved on trap entry
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct TrapContext {
    /// General registers x0..x31
    pub x: [usize; 32],
    /// Supervisor status register (stored as usize for alignment)
    pub sstatus: usize,
    /// Supervisor exception program counter
    pub sepc: usize,
    /// Kernel satp (page table)
    pub kernel_satp: usize,
    /// Kernel stack pointer
    pub kernel_sp: usize,
    /// Trap handler entry point
    pub trap_handler: usize,
}

const SP: usize = 2;
const A0: usize = 10;
const A1: usize = 11;
const A7: usize = 17;

impl TrapContext {
    /// Initialize trap context for a new app
    pub fn app_init_context(
        entry: usize,
        sp: usize,
        kernel_satp: usize,
        kernel_sp: usize,
        trap_handler: usize,
    ) -> Self {
        // SPP = 0 returns to U-mode, SPIE = 1 re-enables interrupts there
        let sstatus_bits: usize = 1 << 5;

        let mut cx = Self {
            x: [0; 32],
            sstatus: sstatus_bits,
            sepc: entry,
            kernel_satp,
            kernel_sp,
            trap_handler,
        };
        cx.set_sp(sp);
        cx
    }

    /// Set stack pointer (x2)
    pub fn set_sp(&mut self, sp: usize) {
        self.x[SP] = sp;
    }

    /// Syscall id from a7
    pub fn syscall_id(&self) -> usize {
        self.x[A7]
    }

    /// Syscall arguments from a0..a5
    pub fn syscall_args(&self) -> [usize; 6] {
        let mut args = [0; 6];
        args.copy_from_slice(&self.x[A0..A0 + 6]);
        args
    }

    /// Load a syscall request, as user code does before `ecall`.
    pub fn set_syscall(&mut self, id: usize, args: [usize; 6]) {
        self.x[A7] = id;
        self.x[A0..A0 + 6].copy_from_slice(&args);
    }

    /// Store a syscall result in a0
    pub fn set_return(&mut self, ret: isize) {
        self.x[A0] = ret as usize;
    }

    pub fn return_value(&self) -> isize {
        self.x[A0] as isize
    }

    pub fn set_arg1(&mut self, value: usize) {
        self.x[A1] = value;
    }
}
