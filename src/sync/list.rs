// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Lock-free singly-linked list.
//!
//! Head and tail sentinels with atomic `next` links. Insertion at either
//! end and traversal are safe to run concurrently from any number of
//! threads. Removal (`pop_front`, `pop_back`, `remove`) reclaims nodes and
//! is **not** safe against concurrent removal or traversal: callers must
//! guarantee a single remover with no concurrent readers, either by
//! single-consumer discipline (work queues) or by holding the owning
//! container's lock (list values pop under the map's slot write lock).

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct LfNode<T> {
    value: Option<T>,
    next: AtomicPtr<LfNode<T>>,
}

impl<T> LfNode<T> {
    fn boxed(value: Option<T>, next: *mut LfNode<T>) -> *mut LfNode<T> {
        Box::into_raw(Box::new(LfNode {
            value,
            next: AtomicPtr::new(next),
        }))
    }
}

/// Lock-free singly-linked list with head/tail sentinels.
pub struct LockFreeList<T> {
    head: *mut LfNode<T>,
    tail: *mut LfNode<T>,
}

unsafe impl<T: Send> Send for LockFreeList<T> {}
unsafe impl<T: Send + Sync> Sync for LockFreeList<T> {}

impl<T> LockFreeList<T> {
    pub fn new() -> LockFreeList<T> {
        let tail = LfNode::boxed(None, ptr::null_mut());
        let head = LfNode::boxed(None, tail);
        LockFreeList { head, tail }
    }

    /// Prepends by compare-and-swapping the head sentinel's link.
    pub fn push_front(&self, value: T) {
        let node = LfNode::boxed(Some(value), ptr::null_mut());
        unsafe {
            loop {
                let right = (*self.head).next.load(Ordering::Acquire);
                (*node).next.store(right, Ordering::Relaxed);
                if (*self.head)
                    .next
                    .compare_exchange(right, node, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
        }
    }

    /// Appends by walking to the last node and compare-and-swapping its
    /// link; a lost race re-walks.
    pub fn push_back(&self, value: T) {
        let node = LfNode::boxed(Some(value), self.tail);
        unsafe {
            loop {
                let (last, _) = self.take_last();
                if (*last)
                    .next
                    .compare_exchange(self.tail, node, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
        }
    }

    /// Removes and returns the first element.
    pub fn pop_front(&self) -> Option<T> {
        unsafe {
            loop {
                let node = (*self.head).next.load(Ordering::Acquire);
                if node == self.tail {
                    return None;
                }
                let right = (*node).next.load(Ordering::Acquire);
                if (*self.head)
                    .next
                    .compare_exchange(node, right, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return Box::from_raw(node).value;
                }
            }
        }
    }

    /// Removes and returns the last element.
    pub fn pop_back(&self) -> Option<T> {
        unsafe {
            loop {
                let (last, prev) = self.take_last();
                if last == self.head {
                    return None;
                }
                if (*prev)
                    .next
                    .compare_exchange(last, self.tail, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return Box::from_raw(last).value;
                }
            }
        }
    }

    /// Removes and returns the element at `index`, or `None` when the list
    /// is shorter than that.
    pub fn remove(&self, index: usize) -> Option<T> {
        unsafe {
            loop {
                let (left, node) = self.take(index);
                if node == self.tail {
                    return None;
                }
                let right = (*node).next.load(Ordering::Acquire);
                if (*left)
                    .next
                    .compare_exchange(node, right, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return Box::from_raw(node).value;
                }
            }
        }
    }

    /// Walks to `index`, returning the predecessor and the node; the node
    /// is the tail sentinel when the list is shorter than `index + 1`.
    fn take(&self, index: usize) -> (*mut LfNode<T>, *mut LfNode<T>) {
        unsafe {
            let mut prev = self.head;
            let mut node = (*self.head).next.load(Ordering::Acquire);
            let mut remain = index;
            while remain > 0 && node != self.tail {
                prev = node;
                node = (*node).next.load(Ordering::Acquire);
                remain -= 1;
            }
            (prev, node)
        }
    }

    /// Walks to the last real node, returning it and its predecessor. When
    /// the list is empty the last node is the head sentinel itself.
    fn take_last(&self) -> (*mut LfNode<T>, *mut LfNode<T>) {
        unsafe {
            let mut prev = self.head;
            let mut node = self.head;
            let mut next = (*node).next.load(Ordering::Acquire);
            while next != self.tail {
                prev = node;
                node = next;
                next = (*node).next.load(Ordering::Acquire);
            }
            (node, prev)
        }
    }

    pub fn is_empty(&self) -> bool {
        unsafe { (*self.head).next.load(Ordering::Acquire) == self.tail }
    }

    /// Element count; walks the whole list.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Borrowing iterator over the elements.
    ///
    /// Safe only while no concurrent removal can run; insertion during
    /// iteration is fine and newly linked nodes may or may not be seen.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: unsafe { (*self.head).next.load(Ordering::Acquire) },
            tail: self.tail,
            _list: self,
        }
    }
}

impl<T> Default for LockFreeList<T> {
    fn default() -> Self {
        LockFreeList::new()
    }
}

impl<T> Drop for LockFreeList<T> {
    fn drop(&mut self) {
        unsafe {
            let mut node = self.head;
            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed);
                drop(Box::from_raw(node));
                node = next;
            }
        }
    }
}

/// Borrowing list iterator.
pub struct Iter<'a, T> {
    node: *const LfNode<T>,
    tail: *const LfNode<T>,
    _list: &'a LockFreeList<T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.node == self.tail {
            return None;
        }
        unsafe {
            let value = (*self.node).value.as_ref();
            self.node = (*self.node).next.load(Ordering::Acquire);
            value
        }
    }
}
