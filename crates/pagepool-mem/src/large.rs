//! Capacity-bounded pool of variable-sized large pages with best-fit reuse.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pagepool_core::chunk::SizedChunk;
use pagepool_core::time::LogicalTime;

use crate::handle::PooledChunk;

type SharedRelease<L> = Arc<dyn Fn(L) + Send + Sync + 'static>;

struct LargeState<L: SizedChunk> {
    pages: Vec<(LogicalTime, PooledChunk<L>)>,
    /// Sum of `pages[i].size()`; maintained incrementally.
    total_size: usize,
}

impl<L: SizedChunk> LargeState<L> {
    fn compute_total_size(&self) -> usize {
        self.pages.iter().map(|(_, page)| page.size()).sum()
    }
}

pub struct LargePagePool<L: SizedChunk> {
    state: Mutex<LargeState<L>>,
    max_total_size: usize,
    release: SharedRelease<L>,
}

impl<L: SizedChunk> LargePagePool<L> {
    /// `release` runs for every page the pool evicts (never for pages handed
    /// back through [`LargePagePool::remove`]).
    pub fn new(max_total_size: usize, release: impl Fn(L) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(LargeState {
                pages: Vec::new(),
                total_size: 0,
            }),
            max_total_size,
            release: Arc::new(release),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LargeState<L>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit pages from `pages`, in order, while they fit under the cap.
    /// Admitted pages are removed from `pages`; the rest stay there for the
    /// caller to dispose of. Existing entries are never evicted to make room.
    /// Returns true if at least one page was admitted.
    pub fn add(&self, pages: &mut Vec<L>, time: LogicalTime) -> bool {
        let mut added_to_pool = false;
        let mut state = self.lock();
        debug_assert_eq!(state.total_size, state.compute_total_size());

        for page in std::mem::take(pages) {
            let size = page.size();
            if state.total_size.saturating_add(size) > self.max_total_size {
                pages.push(page);
                continue;
            }

            state.total_size += size;
            let release = Arc::clone(&self.release);
            state
                .pages
                .push((time, PooledChunk::new(page, move |page| release(page))));
            added_to_pool = true;
        }

        debug_assert_eq!(state.total_size, state.compute_total_size());
        added_to_pool
    }

    /// Best fit: the smallest page of at least `size` bytes. Ties go to the
    /// page stored first. An oversized page is trimmed by the caller's next
    /// full collection, not here.
    pub fn remove(&self, size: usize) -> Option<L> {
        let mut state = self.lock();
        debug_assert_eq!(state.total_size, state.compute_total_size());

        let mut selected: Option<(usize, usize)> = None;
        for (index, (_, page)) in state.pages.iter().enumerate() {
            let page_size = page.size();
            if page_size < size {
                continue;
            }
            if selected.map_or(true, |(_, best)| page_size < best) {
                selected = Some((index, page_size));
            }
        }

        let (index, page_size) = selected?;
        let (_, page) = state.pages.remove(index);
        state.total_size -= page_size;
        debug_assert_eq!(state.total_size, state.compute_total_size());
        Some(page.into_inner())
    }

    pub fn release_all(&self) {
        let doomed = {
            let mut state = self.lock();
            state.total_size = 0;
            std::mem::take(&mut state.pages)
        };
        drop(doomed);
    }

    /// Release every page admitted at or before `time`. Returns the number
    /// of pages released.
    pub fn release_up_to(&self, time: LogicalTime) -> usize {
        let doomed = {
            let mut state = self.lock();
            let (doomed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pages)
                .into_iter()
                .partition(|(stamp, _)| *stamp <= time);
            state.pages = kept;
            let evicted: usize = doomed.iter().map(|(_, page)| page.size()).sum();
            state.total_size -= evicted;
            debug_assert_eq!(state.total_size, state.compute_total_size());
            doomed
        };
        let freed = doomed.len();
        drop(doomed);
        freed
    }

    pub fn total_size(&self) -> usize {
        self.lock().total_size
    }

    pub fn len(&self) -> usize {
        self.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pages.is_empty()
    }

    pub fn max_total_size(&self) -> usize {
        self.max_total_size
    }
}
