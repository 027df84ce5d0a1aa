//! Generation-checked handle tables.
//!
//! A handle is `generation << 32 | (slot + 1)`; zero is the null handle.
//! Removing an entry bumps the slot generation, so a stale handle never
//! resolves, even after the slot is reused.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> HandleTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> u64 {
        let value = Some(Arc::new(value));
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].value = value;
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value,
                });
                self.slots.len() - 1
            }
        };
        encode(index, self.slots[index].generation)
    }

    pub(crate) fn get(&self, handle: u64) -> Option<Arc<T>> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.clone()
    }

    pub(crate) fn remove(&mut self, handle: u64) -> Option<Arc<T>> {
        let (index, generation) = decode(handle)?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }
}

fn encode(index: usize, generation: u32) -> u64 {
    (u64::from(generation) << 32) | (index as u64 + 1)
}

fn decode(handle: u64) -> Option<(usize, u32)> {
    let slot = (handle & 0xFFFF_FFFF) as usize;
    if slot == 0 {
        return None;
    }
    Some((slot - 1, (handle >> 32) as u32))
}

/// Lock a table, recovering from poisoning.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
