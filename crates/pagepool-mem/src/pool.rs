//! The page pool: the page, zone-reservation, and large-page tiers composed
//! behind one handle, plus the teardown eviction policy.
//!
//! Each tier has its own lock and no operation holds two of them, so a
//! concurrent reader may see a teardown's pages migrated before its zone
//! reservations.

use std::sync::{Arc, Weak};

use pagepool_core::chunk::{ChunkSource, PageChunk, SizedChunk};
use pagepool_core::config::{PoolConfig, RELEASE_TASK_DELAY};
use pagepool_core::id::ContextId;
use pagepool_core::platform::{Platform, Task, TaskRunner};
use pagepool_core::time::{LogicalClock, LogicalTime};

use crate::handle::PooledChunk;
use crate::large::LargePagePool;
use crate::tiered::TieredPool;
use crate::tracking::{PoolStats, ReleaseCounters, ReleaseReport};

/// What [`PagePool::release_on_tear_down`] did with the context's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TearDownOutcome {
    /// Sharing is disabled; local entries were released directly.
    ReleasedImmediately,
    /// Neither shared pool holds anything, so no eviction was scheduled.
    NothingShared { time: LogicalTime },
    /// An eviction of everything shared up to `time` is scheduled on `target`.
    HandedOff {
        time: LogicalTime,
        target: ContextId,
    },
    /// No other live context; the shared pools were released right away.
    NoPeer { time: LogicalTime },
}

struct PoolInner<S: ChunkSource, P: Platform> {
    config: PoolConfig,
    source: Arc<S>,
    platform: Arc<P>,
    next_time: LogicalClock,
    page_pool: TieredPool<PooledChunk<S::Page>>,
    zone_pool: TieredPool<PooledChunk<S::Reservation>>,
    large_pool: LargePagePool<S::LargePage>,
    counters: Arc<ReleaseCounters>,
}

/// Shared handle to the pool. Cloning is cheap; scheduled tasks hold only a
/// weak reference and do nothing once the last handle is gone.
pub struct PagePool<S: ChunkSource, P: Platform> {
    inner: Arc<PoolInner<S, P>>,
}

impl<S: ChunkSource, P: Platform> Clone for PagePool<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ChunkSource, P: Platform> PagePool<S, P> {
    pub fn new(config: PoolConfig, source: Arc<S>, platform: Arc<P>) -> Self {
        let counters = Arc::new(ReleaseCounters::new());

        let large_source = Arc::clone(&source);
        let large_counters = Arc::clone(&counters);
        let large_pool = LargePagePool::new(config.max_large_page_pool_bytes(), move |page: S::LargePage| {
            large_counters.record_large_page();
            large_source.delete_large_page(page);
        });

        Self {
            inner: Arc::new(PoolInner {
                config,
                source,
                platform,
                next_time: LogicalClock::new(),
                page_pool: TieredPool::new(),
                zone_pool: TieredPool::new(),
                large_pool,
                counters,
            }),
        }
    }

    fn from_weak(weak: &Weak<PoolInner<S, P>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Pool a regular page freed by `context`.
    ///
    /// The page must be a plain data page whose slots were already released;
    /// trusted and executable pages are never pooled.
    pub fn add(&self, context: ContextId, page: S::Page) {
        debug_assert_eq!(page.size(), <S::Page as PageChunk>::PAGE_SIZE);
        debug_assert!(!page.is_large_page());
        debug_assert!(!page.is_trusted());
        debug_assert!(!page.is_executable());
        debug_assert!(!page.contains_any_slots());

        let source = Arc::clone(&self.inner.source);
        let counters = Arc::clone(&self.inner.counters);
        self.inner.page_pool.put_local(
            context,
            PooledChunk::new(page, move |page| {
                counters.record_page();
                source.delete_page(page);
            }),
        );
    }

    pub fn remove(&self, context: ContextId) -> Option<S::Page> {
        self.inner.page_pool.get(context).map(PooledChunk::into_inner)
    }

    pub fn add_zone_reservation(&self, context: ContextId, reservation: S::Reservation) {
        let counters = Arc::clone(&self.inner.counters);
        self.inner.zone_pool.put_local(
            context,
            PooledChunk::new(reservation, move |reservation| {
                counters.record_zone_reservation();
                drop(reservation);
            }),
        );
    }

    pub fn remove_zone_reservation(&self, context: ContextId) -> Option<S::Reservation> {
        self.inner.zone_pool.get(context).map(PooledChunk::into_inner)
    }

    /// Offer large pages freed by `context`. Pages that do not fit under the
    /// pool's cap are left in `pages` for the caller to free.
    ///
    /// Admitted pages are evicted after the configured timeout by a task
    /// posted either on `context` (single-threaded mode) or on a worker.
    pub fn add_large(&self, context: ContextId, pages: &mut Vec<S::LargePage>) {
        let time = self.inner.next_time.advance();
        let added_to_pool = self.inner.large_pool.add(pages, time);

        #[cfg(feature = "tracing")]
        tracing::trace!(%context, %time, added_to_pool, rejected = pages.len(), "large pages offered");

        let Some(timeout) = self.inner.config.large_page_pool_timeout() else {
            return;
        };
        if !added_to_pool {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let task: Task = Box::new(move || {
            if let Some(pool) = Self::from_weak(&weak) {
                let _freed = pool.inner.large_pool.release_up_to(time);
                #[cfg(feature = "tracing")]
                tracing::trace!(%time, freed = _freed, "large page pool eviction");
            }
        });

        if self.inner.config.single_threaded {
            self.inner.platform.post_delayed_task(context, task, timeout);
        } else {
            self.inner.platform.post_delayed_task_on_worker(task, timeout);
        }
    }

    /// Best-fit reuse of a pooled large page of at least `size` bytes.
    pub fn remove_large(&self, _context: ContextId, size: usize) -> Option<S::LargePage> {
        self.inner.large_pool.remove(size)
    }

    /// Called when `context` is torn down.
    ///
    /// With sharing enabled, the context's pages and zone reservations move
    /// to the shared pools where other contexts can pick them up, and another
    /// live context is asked to evict them after [`RELEASE_TASK_DELAY`]. With
    /// no other context to hand the work to, they are released right away.
    /// Large pages are always released in full.
    pub fn release_on_tear_down(&self, context: ContextId) -> TearDownOutcome {
        if !self.inner.config.share_memory_on_teardown {
            self.release_immediately(context);
            return TearDownOutcome::ReleasedImmediately;
        }

        let time = self.inner.next_time.advance();

        let shared_page_pool_populated = self.inner.page_pool.move_local_to_shared(context, time);
        let shared_zone_pool_populated = self.inner.zone_pool.move_local_to_shared(context, time);

        let outcome = if shared_page_pool_populated || shared_zone_pool_populated {
            self.schedule_shared_release(context, time)
        } else {
            TearDownOutcome::NothingShared { time }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%context, ?outcome, "pool teardown");

        self.inner.large_pool.release_all();
        outcome
    }

    fn schedule_shared_release(&self, context: ContextId, time: LogicalTime) -> TearDownOutcome {
        let weak = Arc::downgrade(&self.inner);
        let mut target = None;

        let found = self.inner.platform.find_another_context_locked(
            context,
            &mut |other: ContextId, runner: &dyn TaskRunner| {
                debug_assert_ne!(other, context);
                let weak = weak.clone();
                runner.post_delayed_task(
                    Box::new(move || {
                        if let Some(pool) = Self::from_weak(&weak) {
                            pool.release_up_to(other, time);
                        }
                    }),
                    RELEASE_TASK_DELAY,
                );
                target = Some(other);
            },
        );

        match (found, target) {
            (true, Some(target)) => TearDownOutcome::HandedOff { time, target },
            _ => {
                self.inner.page_pool.release_shared();
                self.inner.zone_pool.release_shared();
                TearDownOutcome::NoPeer { time }
            }
        }
    }

    /// Release `context`'s own pages and zone reservations and the whole
    /// large pool, without going through the shared pools.
    pub fn release_immediately(&self, context: ContextId) {
        self.inner.page_pool.release_local_for(context);
        self.inner.zone_pool.release_local_for(context);
        self.inner.large_pool.release_all();
    }

    pub fn release_large_immediately(&self) {
        self.inner.large_pool.release_all();
    }

    /// Process teardown. Every context must already have gone through
    /// [`PagePool::release_on_tear_down`].
    pub fn tear_down(&self) {
        self.inner.page_pool.tear_down();
        self.inner.zone_pool.tear_down();
        self.inner.large_pool.release_all();
    }

    /// Evict shared pages and zone reservations stamped at or before `time`.
    /// `context` only labels the diagnostics line.
    pub fn release_up_to(&self, context: ContextId, time: LogicalTime) -> ReleaseReport {
        let report = ReleaseReport {
            pages_removed: self.inner.page_pool.release_up_to(time),
            zone_reservations_removed: self.inner.zone_pool.release_up_to(time),
        };
        report.emit(context, self.inner.config.trace_pool);
        report
    }

    /// Pages in `context`'s local pool.
    pub fn get_count(&self, context: ContextId) -> usize {
        self.inner.page_pool.local_size(context)
    }

    pub fn get_shared_count(&self) -> usize {
        self.inner.page_pool.shared_size()
    }

    pub fn get_total_count(&self) -> usize {
        self.inner.page_pool.size()
    }

    pub fn zone_reservation_count(&self) -> usize {
        self.inner.zone_pool.size()
    }

    pub fn large_count(&self) -> usize {
        self.inner.large_pool.len()
    }

    pub fn large_pool_size(&self) -> usize {
        self.inner.large_pool.total_size()
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            pooled_pages: self.inner.page_pool.size(),
            shared_pages: self.inner.page_pool.shared_size(),
            pooled_zone_reservations: self.inner.zone_pool.size(),
            pooled_large_pages: self.inner.large_pool.len(),
            large_pool_bytes: self.inner.large_pool.total_size(),
            large_pool_capacity_bytes: self.inner.large_pool.max_total_size(),
            pages_released: counters.pages(),
            zone_reservations_released: counters.zone_reservations(),
            large_pages_released: counters.large_pages(),
        }
    }
}
