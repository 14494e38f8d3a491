//! Windowed slot storage.
//!
//! One slot per key: storing overwrites whatever was there, so stale entries
//! are reclaimed lazily on the next access instead of being swept. Each slot
//! lives behind its own mutex; the cache holds that mutex across
//! compute-and-store, which is what makes execution at-most-once per
//! (key, window).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use cadence_schedule::Window;

use crate::key::CallKey;

/// One cached slot: the window it was computed in and the outcome.
pub(crate) struct Slot<T, E> {
    pub(crate) window: Window,
    pub(crate) outcome: Result<T, E>,
    stored_at: Instant,
}

impl<T, E> Slot<T, E> {
    pub(crate) fn new(window: Window, outcome: Result<T, E>) -> Self {
        Self {
            window,
            outcome,
            stored_at: Instant::now(),
        }
    }

    /// A slot is fresh iff it was stored in the current window.
    pub(crate) fn is_fresh(&self, current: Window) -> bool {
        self.window == current
    }
}

pub(crate) type SlotCell<T, E> = Arc<Mutex<Option<Slot<T, E>>>>;

/// Key-to-slot map for one wrapped function.
pub(crate) struct WindowStore<T, E> {
    cells: RwLock<HashMap<CallKey, SlotCell<T, E>>>,
    max_entries: usize,
}

impl<T, E> WindowStore<T, E> {
    /// Creates a store bounded to `max_entries` keys (0 = unbounded).
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Returns the slot cell for `key`, creating it if absent.
    ///
    /// Creation may evict: stale slots first, then the least recently
    /// stored. Cells that are locked or not yet populated are never evicted,
    /// since a compute may be in flight behind them; the bound can therefore
    /// overshoot by the number of concurrent first computes.
    pub(crate) fn cell(&self, key: &CallKey, current: Window) -> SlotCell<T, E> {
        if let Some(cell) = self.cells.read().get(key) {
            return cell.clone();
        }

        let mut cells = self.cells.write();
        // Another thread may have created the cell while we upgraded.
        if let Some(cell) = cells.get(key) {
            return cell.clone();
        }

        if self.max_entries > 0 && cells.len() >= self.max_entries {
            evict(&mut cells, current, self.max_entries);
        }

        let cell: SlotCell<T, E> = Arc::new(Mutex::new(None));
        cells.insert(key.clone(), cell.clone());
        cell
    }

    /// Stores an outcome for `key`, overwriting any prior slot.
    pub(crate) fn put(&self, key: &CallKey, current: Window, outcome: Result<T, E>) {
        let cell = self.cell(key, current);
        *cell.lock() = Some(Slot::new(current, outcome));
    }

    /// Removes the slot for `key`. Returns true if one existed.
    pub(crate) fn remove(&self, key: &CallKey) -> bool {
        self.cells.write().remove(key).is_some()
    }

    /// Drops every slot.
    pub(crate) fn clear(&self) {
        self.cells.write().clear();
    }

    /// Number of keys currently tracked.
    pub(crate) fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Statistics relative to the current window.
    pub(crate) fn stats(&self, current: Window) -> CacheStats {
        let cells = self.cells.read();
        let mut fresh = 0;
        let mut stale = 0;
        for cell in cells.values() {
            // A locked cell has a compute in flight; count it as neither.
            if let Some(guard) = cell.try_lock() {
                match guard.as_ref() {
                    Some(slot) if slot.is_fresh(current) => fresh += 1,
                    Some(_) => stale += 1,
                    None => {}
                }
            }
        }
        CacheStats {
            total_entries: cells.len(),
            fresh_entries: fresh,
            stale_entries: stale,
            capacity: self.max_entries,
        }
    }
}

impl<T: Clone, E: Clone> WindowStore<T, E> {
    /// Snapshot of the slot for `key`, if any.
    pub(crate) fn get(&self, key: &CallKey) -> Option<(Window, Result<T, E>)> {
        let cell = self.cells.read().get(key)?.clone();
        let guard = cell.lock();
        guard
            .as_ref()
            .map(|slot| (slot.window, slot.outcome.clone()))
    }
}

fn evict<T, E>(
    cells: &mut HashMap<CallKey, SlotCell<T, E>>,
    current: Window,
    max_entries: usize,
) {
    let before = cells.len();

    // Stale slots go first; they would be recomputed on access anyway.
    cells.retain(|_, cell| match cell.try_lock() {
        Some(guard) => match guard.as_ref() {
            Some(slot) => slot.is_fresh(current),
            None => true,
        },
        None => true,
    });

    // Still at capacity: drop the least recently stored fresh slots.
    while cells.len() >= max_entries {
        let oldest = cells
            .iter()
            .filter_map(|(key, cell)| {
                let guard = cell.try_lock()?;
                let slot = guard.as_ref()?;
                Some((key.clone(), slot.stored_at))
            })
            .min_by_key(|(_, stored_at)| *stored_at)
            .map(|(key, _)| key);
        match oldest {
            Some(key) => {
                cells.remove(&key);
            }
            None => break,
        }
    }

    debug!(evicted = before - cells.len(), "cache eviction");
}

/// Cache statistics relative to the current window.
#[derive(Clone, Debug)]
pub struct CacheStats {
    /// Keys tracked, fresh or stale.
    pub total_entries: usize,
    /// Entries stored in the current window.
    pub fresh_entries: usize,
    /// Entries from earlier windows, pending lazy overwrite.
    pub stale_entries: usize,
    /// Configured key bound (0 = unbounded).
    pub capacity: usize,
}
