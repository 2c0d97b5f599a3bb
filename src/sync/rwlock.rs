// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Bias-based reader/writer spin-lock.
//!
//! A single atomic counter starts at a large bias. Readers decrement while
//! the counter stays positive; a writer swaps the full bias for zero, so a
//! writer can only enter when no reader is inside and vice versa. The read
//! path is a single compare-and-swap when uncontended.
//!
//! Contention backs off with a bounded exponential spin (1, 2, 4, up to
//! 2048 pause hints) before yielding the thread. The lock is not reentrant.
//! Writers hold it only for short critical sections: pointer swaps during
//! rehash and single-node mutation under a slot lock.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI32, Ordering};

/// Counter value of an unlocked lock.
pub const LOCK_BIAS: i32 = 1 << 28;

/// Upper bound of the exponential spin before yielding.
const MAX_SPIN: u32 = 2048;

/// Reader/writer spin-lock owning its protected value.
pub struct RwSpinLock<T> {
    state: AtomicI32,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwSpinLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwSpinLock<T> {}

impl<T> RwSpinLock<T> {
    pub fn new(value: T) -> RwSpinLock<T> {
        RwSpinLock {
            state: AtomicI32::new(LOCK_BIAS),
            cell: UnsafeCell::new(value),
        }
    }

    /// Acquires shared access, spinning then yielding under contention.
    pub fn read(&self) -> ReadGuard<'_, T> {
        loop {
            if self.try_acquire_read() {
                return ReadGuard { lock: self };
            }
            self.backoff_read();
        }
    }

    /// Acquires exclusive access, spinning then yielding under contention.
    pub fn write(&self) -> WriteGuard<'_, T> {
        loop {
            if self.try_acquire_write() {
                return WriteGuard { lock: self };
            }
            self.backoff_write();
        }
    }

    /// Single shared-acquire attempt; never spins.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        if self.try_acquire_read() {
            Some(ReadGuard { lock: self })
        } else {
            None
        }
    }

    /// Single exclusive-acquire attempt; never spins.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        if self.try_acquire_write() {
            Some(WriteGuard { lock: self })
        } else {
            None
        }
    }

    /// Mutable access through an exclusive borrow, no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    fn try_acquire_read(&self) -> bool {
        let current = self.state.load(Ordering::Relaxed);
        current > 0
            && self
                .state
                .compare_exchange(current, current - 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(LOCK_BIAS, 0, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn backoff_read(&self) {
        let mut n = 1u32;
        while n <= MAX_SPIN {
            for _ in 0..n {
                std::hint::spin_loop();
            }
            if self.state.load(Ordering::Relaxed) > 0 {
                return;
            }
            n <<= 1;
        }
        std::thread::yield_now();
    }

    fn backoff_write(&self) {
        let mut n = 1u32;
        while n <= MAX_SPIN {
            for _ in 0..n {
                std::hint::spin_loop();
            }
            if self.state.load(Ordering::Relaxed) == LOCK_BIAS {
                return;
            }
            n <<= 1;
        }
        std::thread::yield_now();
    }

    /// Current raw counter value, for assertions.
    #[cfg(test)]
    pub(crate) fn raw_state(&self) -> i32 {
        self.state.load(Ordering::Relaxed)
    }

    // Guard-free acquire/release used by the map iterator, which pins one
    // slot lock at a time while borrowing through the giant-lock guard.

    pub(crate) fn raw_read_lock(&self) {
        while !self.try_acquire_read() {
            self.backoff_read();
        }
    }

    pub(crate) fn raw_read_unlock(&self) {
        self.state.fetch_add(1, Ordering::Release);
    }

    /// Raw pointer to the protected value.
    ///
    /// Callers must hold the lock in the matching mode for any access.
    pub(crate) fn data_ptr(&self) -> *mut T {
        self.cell.get()
    }
}

/// Shared-access guard; releases on drop.
pub struct ReadGuard<'a, T> {
    lock: &'a RwSpinLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_add(1, Ordering::Release);
    }
}

/// Exclusive-access guard; releases on drop.
pub struct WriteGuard<'a, T> {
    lock: &'a RwSpinLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(LOCK_BIAS, Ordering::Release);
    }
}
