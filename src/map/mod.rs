// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent, resizable hash map.
//!
//! The map is slotted: each slot holds a singly-linked chain of nodes
//! behind its own reader/writer spin-lock. Above the slots sits the giant
//! lock. Every data-path operation (`put`, `get`, `delete`, `exec`, the
//! iterator) holds the giant lock in read mode, which guarantees the slot
//! array cannot be swapped underfoot; only rehash takes it in write mode.
//!
//! ## Locking discipline
//!
//! 1. Acquire the giant lock (read).
//! 2. Pick the slot from the hash, acquire its lock (read for lookups,
//!    write for mutation).
//! 3. Never call back into the map while holding either level. A writer
//!    that decides the table must grow or shrink releases both locks first
//!    and re-enters through `resize_for`.
//!
//! ## Resizing
//!
//! Inserts that push the load factor over the upper threshold, and deletes
//! that drop it under the lower one, rebuild the slot array sized to land
//! the load mid-band. Rehash moves nodes; it never clones keys or values.

use crate::error::{AmberError, AmberResult};
use crate::sync::rwlock::{ReadGuard, RwSpinLock};
use crate::value::key::{KeyBoundle, Version};
use crate::value::obj::ValueHandle;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(test)]
mod map_test;

/// Load factor above which an insert triggers growth.
const BALANCE_FACTOR_UP: f32 = 0.9;

/// Load factor below which a delete triggers shrinking.
const BALANCE_FACTOR_DOWN: f32 = 0.2;

struct Node {
    key: KeyBoundle,
    value: ValueHandle,
    next: Option<Box<Node>>,
}

type Chain = Option<Box<Node>>;

struct Slot {
    chain: RwSpinLock<Chain>,
}

struct Table {
    slots: Box<[Slot]>,
}

impl Table {
    fn with_slots(num_slots: usize) -> Table {
        let mut slots = Vec::with_capacity(num_slots);
        slots.resize_with(num_slots, || Slot {
            chain: RwSpinLock::new(None),
        });
        Table {
            slots: slots.into_boxed_slice(),
        }
    }
}

/// Slotted hash map with per-slot locks and a giant rehash lock.
pub struct ConcurrentHashMap {
    giant: RwSpinLock<Table>,
    num_keys: AtomicUsize,
    min_slots: usize,
}

impl ConcurrentHashMap {
    /// Creates a map with `initial_slots` slots, which is also the floor
    /// the table never shrinks below.
    pub fn new(initial_slots: usize) -> ConcurrentHashMap {
        let initial_slots = initial_slots.max(1);
        ConcurrentHashMap {
            giant: RwSpinLock::new(Table::with_slots(initial_slots)),
            num_keys: AtomicUsize::new(0),
            min_slots: initial_slots,
        }
    }

    /// SDBM accumulator masked to 31 bits.
    pub fn hash(key: &[u8]) -> u32 {
        let mut h: u32 = 0;
        for &c in key {
            h = u32::from(c)
                .wrapping_add(h << 6)
                .wrapping_add(h << 16)
                .wrapping_sub(h);
        }
        h & 0x7fff_ffff
    }

    fn slot_index(key: &[u8], num_slots: usize) -> usize {
        ((Self::hash(key) | 1) as usize) % num_slots
    }

    /// Inserts or overwrites, returning the displaced value when the key
    /// already existed. A new key allocates its boundle with the supplied
    /// version; an overwrite leaves the existing boundle in place.
    pub fn put(&self, key: &[u8], version_number: u64, value: ValueHandle) -> Option<ValueHandle> {
        loop {
            let table = self.giant.read();
            let slot = &table.slots[Self::slot_index(key, table.slots.len())];
            let mut chain = slot.chain.write();

            if let Some(node) = find_mut(&mut chain, key) {
                return Some(std::mem::replace(&mut node.value, value));
            }

            let num_keys = self.num_keys.fetch_add(1, Ordering::Release) + 1;
            if Self::load(num_keys, table.slots.len()) > BALANCE_FACTOR_UP {
                self.num_keys.fetch_sub(1, Ordering::Release);
                drop(chain);
                drop(table);
                self.resize_for(self.num_keys.load(Ordering::Acquire));
                continue;
            }

            let node = Box::new(Node {
                key: KeyBoundle::build(key, 0, version_number),
                value,
                next: chain.take(),
            });
            *chain = Some(node);
            return None;
        }
    }

    /// Reads the version and clones a value reference.
    pub fn get(&self, key: &[u8]) -> AmberResult<(Version, ValueHandle)> {
        let table = self.giant.read();
        let slot = &table.slots[Self::slot_index(key, table.slots.len())];
        let chain = slot.chain.read();
        match find(&chain, key) {
            Some(node) => Ok((node.key.version(), node.value.clone())),
            None => Err(AmberError::NotFound),
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.exec(key, |_, _| ()).is_ok()
    }

    /// Removes an entry, returning its value so the caller can decide
    /// whether to drop it inline or hand it to the background worker.
    pub fn delete(&self, key: &[u8]) -> Option<ValueHandle> {
        let (value, shrink) = {
            let table = self.giant.read();
            let slot = &table.slots[Self::slot_index(key, table.slots.len())];
            let mut chain = slot.chain.write();
            let node = remove_node(&mut chain, key)?;
            let num_keys = self.num_keys.fetch_sub(1, Ordering::Release) - 1;
            let shrink = Self::load(num_keys, table.slots.len()) < BALANCE_FACTOR_DOWN
                && table.slots.len() > self.min_slots;
            (node.value, shrink)
        };
        if shrink {
            self.resize_for(self.num_keys.load(Ordering::Acquire));
        }
        Some(value)
    }

    /// Runs `proc` on the entry under the slot read-lock.
    ///
    /// Concurrent-insert-safe list operations (push, traverse) belong
    /// here; anything that unlinks list nodes needs [`exec_mut`].
    ///
    /// [`exec_mut`]: ConcurrentHashMap::exec_mut
    pub fn exec<R>(&self, key: &[u8], proc: impl FnOnce(Version, &ValueHandle) -> R) -> AmberResult<R> {
        let table = self.giant.read();
        let slot = &table.slots[Self::slot_index(key, table.slots.len())];
        let chain = slot.chain.read();
        match find(&chain, key) {
            Some(node) => Ok(proc(node.key.version(), &node.value)),
            None => Err(AmberError::NotFound),
        }
    }

    /// Runs `proc` on the entry under the slot write-lock, excluding every
    /// reader and writer of that slot. List pops run here so node
    /// reclamation cannot race a traversal.
    pub fn exec_mut<R>(
        &self,
        key: &[u8],
        proc: impl FnOnce(Version, &ValueHandle) -> R,
    ) -> AmberResult<R> {
        let table = self.giant.read();
        let slot = &table.slots[Self::slot_index(key, table.slots.len())];
        let chain = slot.chain.write();
        match find(&chain, key) {
            Some(node) => Ok(proc(node.key.version(), &node.value)),
            None => Err(AmberError::NotFound),
        }
    }

    pub fn num_keys(&self) -> usize {
        self.num_keys.load(Ordering::Acquire)
    }

    pub fn num_slots(&self) -> usize {
        self.giant.read().slots.len()
    }

    /// Snapshot iterator.
    ///
    /// Holds the giant read-lock for its whole lifetime, so rehash is
    /// blocked until it drops; iterate promptly. Within the current slot
    /// the iterator additionally pins the slot read-lock, keeping entry
    /// references stable against concurrent mutation of that slot.
    pub fn iter(&self) -> MapIter<'_> {
        MapIter {
            guard: self.giant.read(),
            slot: 0,
            node: std::ptr::null(),
            slot_locked: false,
        }
    }

    /// Rebuilds the slot array for `num_keys` entries, targeting the
    /// middle of the balance band, clamped to the initial slot count.
    pub fn resize_for(&self, num_keys: usize) {
        let mid = BALANCE_FACTOR_DOWN + (BALANCE_FACTOR_UP - BALANCE_FACTOR_DOWN) / 2.0;
        let mut new_slots = (num_keys as f32 / mid) as usize;
        if new_slots < self.min_slots {
            new_slots = self.min_slots;
        }

        let mut table = self.giant.write();
        if table.slots.len() == new_slots {
            return;
        }
        let mut fresh = Table::with_slots(new_slots);
        for slot in table.slots.iter_mut() {
            let mut chain = slot.chain.get_mut().take();
            while let Some(mut node) = chain {
                chain = node.next.take();
                let index = Self::slot_index(node.key.key(), new_slots);
                let target = fresh.slots[index].chain.get_mut();
                node.next = target.take();
                *target = Some(node);
            }
        }
        *table = fresh;
    }

    fn load(num_keys: usize, num_slots: usize) -> f32 {
        num_keys as f32 / num_slots as f32
    }
}

fn find<'a>(chain: &'a Chain, key: &[u8]) -> Option<&'a Node> {
    let mut cur = chain.as_deref();
    while let Some(node) = cur {
        if node.key.key() == key {
            return Some(node);
        }
        cur = node.next.as_deref();
    }
    None
}

fn find_mut<'a>(chain: &'a mut Chain, key: &[u8]) -> Option<&'a mut Node> {
    let matches = match chain {
        Some(node) => node.key.key() == key,
        None => return None,
    };
    if matches {
        chain.as_deref_mut()
    } else {
        find_mut(&mut chain.as_mut().expect("checked above").next, key)
    }
}

fn remove_node(chain: &mut Chain, key: &[u8]) -> Option<Box<Node>> {
    let matches = match chain {
        Some(node) => node.key.key() == key,
        None => return None,
    };
    if matches {
        let mut node = chain.take().expect("checked above");
        *chain = node.next.take();
        Some(node)
    } else {
        remove_node(&mut chain.as_mut().expect("checked above").next, key)
    }
}

/// Snapshot iterator over the map; see [`ConcurrentHashMap::iter`].
pub struct MapIter<'a> {
    guard: ReadGuard<'a, Table>,
    slot: usize,
    node: *const Node,
    slot_locked: bool,
}

impl MapIter<'_> {
    /// Positions on the first entry in slot order.
    pub fn seek_to_first(&mut self) {
        self.release_slot();
        self.slot = 0;
        self.node = std::ptr::null();
        self.advance_slot(0);
    }

    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    /// Moves to the next entry: chain order within a slot, then slot order.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        // Holding the slot read-lock keeps the node alive here.
        let next = unsafe { (*self.node).next.as_deref() };
        match next {
            Some(node) => self.node = node as *const Node,
            None => {
                let from = self.slot + 1;
                self.release_slot();
                self.node = std::ptr::null();
                self.advance_slot(from);
            }
        }
    }

    pub fn key(&self) -> &KeyBoundle {
        debug_assert!(self.valid());
        unsafe { &(*self.node).key }
    }

    pub fn value(&self) -> &ValueHandle {
        debug_assert!(self.valid());
        unsafe { &(*self.node).value }
    }

    /// Finds the next non-empty slot at or after `from`, pinning its lock.
    fn advance_slot(&mut self, from: usize) {
        let slots = &self.guard.slots;
        for index in from..slots.len() {
            let slot = &slots[index];
            slot.chain.raw_read_lock();
            let head = unsafe { (*slot.chain.data_ptr()).as_deref() };
            match head {
                Some(node) => {
                    self.slot = index;
                    self.node = node as *const Node;
                    self.slot_locked = true;
                    return;
                }
                None => slot.chain.raw_read_unlock(),
            }
        }
        self.slot = slots.len();
    }

    fn release_slot(&mut self) {
        if self.slot_locked {
            self.guard.slots[self.slot].chain.raw_read_unlock();
            self.slot_locked = false;
        }
    }
}

impl Drop for MapIter<'_> {
    fn drop(&mut self) {
        self.release_slot();
    }
}
