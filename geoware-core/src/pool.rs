//! Fixed-capacity slot pool with insertion-ordered iteration.
//!
//! Every table on the node (neighbors, subscriptions, readings) is bounded; the pool
//! never grows past the capacity it was built with and reports exhaustion as an error.

use std::collections::VecDeque;

/// Handle to a live slot. Invalidated by `remove`; a later insert may reuse the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

/// Returned when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pool exhausted ({capacity} slots)")]
pub struct PoolFull {
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    /// Live slots, oldest first.
    order: VecDeque<usize>,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            // Reversed so the lowest slot is handed out first.
            free: (0..capacity).rev().collect(),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Insert at the tail of the insertion order.
    pub fn insert(&mut self, value: T) -> Result<SlotId, PoolFull> {
        let idx = self.free.pop().ok_or(PoolFull {
            capacity: self.capacity(),
        })?;
        self.slots[idx] = Some(value);
        self.order.push_back(idx);
        Ok(SlotId(idx))
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let value = self.slots.get_mut(id.0)?.take()?;
        self.order.retain(|&i| i != id.0);
        self.free.push(id.0);
        Some(value)
    }

    /// First live slot (oldest first) matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<SlotId> {
        self.order
            .iter()
            .copied()
            .find(|&i| self.slots[i].as_ref().is_some_and(&mut pred))
            .map(SlotId)
    }

    /// Remove and return the oldest value matching `pred`.
    pub fn remove_first(&mut self, pred: impl FnMut(&T) -> bool) -> Option<T> {
        let id = self.find(pred)?;
        self.remove(id)
    }

    /// Remove every value matching `pred`, returned oldest first.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut out = Vec::new();
        let mut kept = VecDeque::with_capacity(self.order.len());
        while let Some(i) = self.order.pop_front() {
            let matched = self.slots[i].as_ref().is_some_and(&mut pred);
            if matched {
                if let Some(v) = self.slots[i].take() {
                    out.push(v);
                }
                self.free.push(i);
            } else {
                kept.push_back(i);
            }
        }
        self.order = kept;
        out
    }

    /// Values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(|&i| self.slots[i].as_ref())
    }

    /// Slot handles in insertion order.
    pub fn ids(&self) -> Vec<SlotId> {
        self.order.iter().copied().map(SlotId).collect()
    }
}
