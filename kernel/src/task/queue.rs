//! Stride run queue
//!
//! A fixed-capacity circular buffer of `(pid, stride)` pairs. `pop` scans
//! the occupied window `[front, tail)` for the smallest stride, taking the
//! earliest entry on ties, then shifts the entries before it one slot
//! towards the tail so the remaining entries keep their arrival order.
//! O(n) per pop, no pointers, no allocation.

use crate::config::NPROC;

pub struct RunQueue<const N: usize> {
    pids: [usize; N],
    strides: [u64; N],
    front: usize,
    tail: usize,
    empty: bool,
}

/// The kernel's ready queue, one slot per schedulable process
pub type ProcessQueue = RunQueue<NPROC>;

impl<const N: usize> RunQueue<N> {
    pub const fn new() -> Self {
        Self {
            pids: [0; N],
            strides: [0; N],
            front: 0,
            tail: 0,
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else if self.tail > self.front {
            self.tail - self.front
        } else {
            self.tail + N - self.front
        }
    }

    pub fn is_full(&self) -> bool {
        !self.empty && self.front == self.tail
    }

    /// Append `pid` with its current stride.
    ///
    /// # Panics
    /// The capacity equals the number of schedulable processes, so a push
    /// into a full queue means the process bookkeeping is corrupt.
    pub fn push(&mut self, pid: usize, stride: u64) {
        if self.is_full() {
            panic!("run queue overflow pushing pid {}", pid);
        }
        self.empty = false;
        self.pids[self.tail] = pid;
        self.strides[self.tail] = stride;
        self.tail = (self.tail + 1) % N;
    }

    /// Remove and return the pid with the smallest stride.
    pub fn pop(&mut self) -> Option<usize> {
        if self.empty {
            return None;
        }
        let mut min_idx = self.front;
        let mut i = self.front;
        loop {
            if self.strides[i] < self.strides[min_idx] {
                min_idx = i;
            }
            i = (i + 1) % N;
            if i == self.tail {
                break;
            }
        }
        let pid = self.pids[min_idx];

        // Close the gap: everything in [front, min_idx) moves up by one
        let mut i = min_idx;
        while i != self.front {
            let prev = (i + N - 1) % N;
            self.pids[i] = self.pids[prev];
            self.strides[i] = self.strides[prev];
            i = prev;
        }
        self.front = (self.front + 1) % N;
        if self.front == self.tail {
            self.empty = true;
        }
        Some(pid)
    }

    /// Queued pids in arrival order
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        (0..self.len()).map(move |k| {
            let i = (self.front + k) % N;
            (self.pids[i], self.strides[i])
        })
    }
}

impl<const N: usize> Default for RunQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
