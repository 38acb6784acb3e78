//! Two-tier pool: per-context local stacks plus one shared stack of batches.
//!
//! Instantiated once for regular pages and once for zone reservations.
//! Every method takes the single pool lock for structural moves only;
//! anything that releases entries first detaches them into a local, drops
//! the guard, and only then lets the entries go.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pagepool_core::id::ContextId;
use pagepool_core::time::LogicalTime;

type Batch<E> = (LogicalTime, Vec<E>);

struct TierState<E> {
    /// Never maps to an empty vector.
    local: HashMap<ContextId, Vec<E>>,
    /// One batch per teardown, in arrival order. No batch is ever empty.
    shared: Vec<Batch<E>>,
}

impl<E> TierState<E> {
    fn is_consistent(&self) -> bool {
        self.local.values().all(|v| !v.is_empty()) && self.shared.iter().all(|(_, v)| !v.is_empty())
    }
}

pub struct TieredPool<E> {
    state: Mutex<TierState<E>>,
}

impl<E> Default for TieredPool<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TieredPool<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TierState {
                local: HashMap::new(),
                shared: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TierState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_local(&self, context: ContextId, entry: E) {
        let mut state = self.lock();
        state.local.entry(context).or_default().push(entry);
    }

    /// Most recently freed local entry first. A context with nothing local
    /// instead takes from the newest shared batch: that memory is about to
    /// be released anyway, so reusing it is free.
    pub fn get(&self, context: ContextId) -> Option<E> {
        let mut guard = self.lock();
        let state = &mut *guard;
        debug_assert!(state.is_consistent());

        match state.local.entry(context) {
            Entry::Occupied(mut local) => {
                let entry = local.get_mut().pop();
                if local.get().is_empty() {
                    local.remove();
                }
                entry
            }
            Entry::Vacant(_) => {
                let (_, batch) = state.shared.last_mut()?;
                let entry = batch.pop();
                if batch.is_empty() {
                    state.shared.pop();
                }
                entry
            }
        }
    }

    /// Move all of `context`'s local entries into the shared pool as one
    /// batch stamped `time`. Returns whether the shared pool is non-empty
    /// afterwards.
    pub fn move_local_to_shared(&self, context: ContextId, time: LogicalTime) -> bool {
        let mut state = self.lock();
        if let Some(entries) = state.local.remove(&context) {
            debug_assert!(!entries.is_empty());
            state.shared.push((time, entries));
        }
        !state.shared.is_empty()
    }

    pub fn release_shared(&self) {
        let doomed = {
            let mut state = self.lock();
            std::mem::take(&mut state.shared)
        };
        drop(doomed);
    }

    /// Release every context's local entries.
    pub fn release_local(&self) {
        let doomed = {
            let mut state = self.lock();
            std::mem::take(&mut state.local)
        };
        drop(doomed);
    }

    pub fn release_local_for(&self, context: ContextId) {
        let doomed = {
            let mut state = self.lock();
            state.local.remove(&context)
        };
        drop(doomed);
    }

    /// Release every shared batch stamped at or before `time`; later batches
    /// stay. Returns the number of entries released.
    pub fn release_up_to(&self, time: LogicalTime) -> usize {
        let (doomed, freed) = {
            let mut state = self.lock();
            let (doomed, kept): (Vec<Batch<E>>, Vec<Batch<E>>) = std::mem::take(&mut state.shared)
                .into_iter()
                .partition(|(stamp, _)| *stamp <= time);
            state.shared = kept;
            let freed = doomed.iter().map(|(_, entries)| entries.len()).sum();
            (doomed, freed)
        };
        drop(doomed);
        freed
    }

    /// All contexts must already have torn down; drops whatever is shared.
    pub fn tear_down(&self) {
        debug_assert!(self.lock().local.is_empty(), "local pools outlived their contexts");
        self.release_shared();
    }

    /// Local plus shared entries.
    pub fn size(&self) -> usize {
        let state = self.lock();
        let local: usize = state.local.values().map(Vec::len).sum();
        let shared: usize = state.shared.iter().map(|(_, v)| v.len()).sum();
        local + shared
    }

    pub fn local_size(&self, context: ContextId) -> usize {
        self.lock().local.get(&context).map_or(0, Vec::len)
    }

    pub fn shared_size(&self) -> usize {
        self.lock().shared.iter().map(|(_, v)| v.len()).sum()
    }

    /// Number of contexts with a local stack.
    pub fn local_contexts(&self) -> usize {
        self.lock().local.len()
    }

    pub fn shared_batches(&self) -> usize {
        self.lock().shared.len()
    }
}
