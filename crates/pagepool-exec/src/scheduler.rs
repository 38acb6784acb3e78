//! Context registries with per-context delayed-task timelines.
//!
//! A task posted to a context is dropped unrun if that context is removed
//! first. The worker timeline belongs to no context and is never cancelled.

pub use sync_impl::*;

#[cfg(feature = "async-scheduler")]
pub use async_impl::*;

/// Manually driven implementation (default, no tokio dependency).
mod sync_impl {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use pagepool_core::id::ContextId;
    use pagepool_core::platform::{Platform, Task, TaskRunner};

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time shared by every timeline of a group, in nanoseconds.
    #[derive(Default)]
    struct ManualClock {
        nanos: AtomicU64,
        seq: AtomicU64,
    }

    impl ManualClock {
        fn now(&self) -> Duration {
            Duration::from_nanos(self.nanos.load(Ordering::Acquire))
        }

        fn advance(&self, by: Duration) -> Duration {
            let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
            let prev = self.nanos.fetch_add(by, Ordering::AcqRel);
            Duration::from_nanos(prev.saturating_add(by))
        }
    }

    struct Pending {
        due: Duration,
        seq: u64,
        owner: Option<ContextId>,
        task: Task,
    }

    /// Pending delayed tasks of one context (or of the worker).
    pub struct Timeline {
        clock: Arc<ManualClock>,
        /// `None` for the worker timeline.
        owner: Option<ContextId>,
        pending: Mutex<Vec<Pending>>,
    }

    impl Timeline {
        fn new(clock: Arc<ManualClock>, owner: Option<ContextId>) -> Self {
            Self {
                clock,
                owner,
                pending: Mutex::new(Vec::new()),
            }
        }

        fn take_due(&self, now: Duration, out: &mut Vec<Pending>) {
            let mut pending = lock(&self.pending);
            let (due, later): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *pending).into_iter().partition(|p| p.due <= now);
            *pending = later;
            out.extend(due);
        }

        pub fn len(&self) -> usize {
            lock(&self.pending).len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl TaskRunner for Timeline {
        fn post_delayed_task(&self, task: Task, delay: Duration) {
            let pending = Pending {
                due: self.clock.now().saturating_add(delay),
                seq: self.clock.seq.fetch_add(1, Ordering::Relaxed),
                owner: self.owner,
                task,
            };
            lock(&self.pending).push(pending);
        }
    }

    /// Registry of live contexts, each with its own timeline.
    pub struct ContextGroup {
        clock: Arc<ManualClock>,
        next_id: AtomicU64,
        contexts: Mutex<BTreeMap<ContextId, Arc<Timeline>>>,
        worker: Timeline,
    }

    impl Default for ContextGroup {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ContextGroup {
        pub fn new() -> Self {
            let clock = Arc::new(ManualClock::default());
            Self {
                worker: Timeline::new(Arc::clone(&clock), None),
                clock,
                next_id: AtomicU64::new(1),
                contexts: Mutex::new(BTreeMap::new()),
            }
        }

        pub fn create_context(&self) -> ContextId {
            let id = ContextId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let timeline = Arc::new(Timeline::new(Arc::clone(&self.clock), Some(id)));
            lock(&self.contexts).insert(id, timeline);
            id
        }

        /// Remove `context`, cancelling its pending tasks. Returns how many
        /// tasks were cancelled.
        pub fn remove_context(&self, context: ContextId) -> usize {
            let timeline = lock(&self.contexts).remove(&context);
            let Some(timeline) = timeline else {
                return 0;
            };
            let cancelled = std::mem::take(&mut *lock(&timeline.pending));
            let n = cancelled.len();
            drop(cancelled);
            #[cfg(feature = "tracing")]
            tracing::debug!(%context, cancelled = n, "context removed");
            n
        }

        pub fn is_live(&self, context: ContextId) -> bool {
            lock(&self.contexts).contains_key(&context)
        }

        pub fn live_contexts(&self) -> Vec<ContextId> {
            lock(&self.contexts).keys().copied().collect()
        }

        /// Tasks pending on `context`'s timeline (0 if it is not live).
        pub fn pending_tasks(&self, context: ContextId) -> usize {
            lock(&self.contexts).get(&context).map_or(0, |t| t.len())
        }

        pub fn pending_worker_tasks(&self) -> usize {
            self.worker.len()
        }

        pub fn now(&self) -> Duration {
            self.clock.now()
        }

        /// Move virtual time forward and run every task that became due, in
        /// due order, with no lock held. Tasks posted with a zero delay by a
        /// running task also run. Returns the number of tasks run.
        pub fn advance(&self, by: Duration) -> usize {
            let now = self.clock.advance(by);
            let mut ran = 0;
            loop {
                let mut due = Vec::new();
                self.worker.take_due(now, &mut due);
                let timelines: Vec<Arc<Timeline>> = lock(&self.contexts).values().cloned().collect();
                for timeline in &timelines {
                    timeline.take_due(now, &mut due);
                }
                if due.is_empty() {
                    return ran;
                }
                due.sort_by_key(|p| (p.due, p.seq));
                for pending in due {
                    // An earlier task in this batch may have removed the owner.
                    if let Some(ctx) = pending.owner {
                        if !self.is_live(ctx) {
                            continue;
                        }
                    }
                    (pending.task)();
                    ran += 1;
                }
            }
        }

        /// Run everything currently scheduled, however far in the future.
        pub fn run_until_idle(&self) -> usize {
            let mut ran = 0;
            loop {
                let latest = self.latest_due();
                match latest {
                    Some(due) => {
                        let by = due.saturating_sub(self.clock.now());
                        ran += self.advance(by);
                    }
                    None => return ran,
                }
            }
        }

        fn latest_due(&self) -> Option<Duration> {
            let contexts = lock(&self.contexts);
            std::iter::once(&self.worker)
                .chain(contexts.values().map(|t| &**t))
                .filter_map(|t| lock(&t.pending).iter().map(|p| p.due).max())
                .max()
        }
    }

    impl Platform for ContextGroup {
        fn find_another_context_locked(
            &self,
            excluding: ContextId,
            schedule: &mut dyn FnMut(ContextId, &dyn TaskRunner),
        ) -> bool {
            let contexts = lock(&self.contexts);
            match contexts.iter().find(|(id, _)| **id != excluding) {
                Some((id, timeline)) => {
                    schedule(*id, &**timeline);
                    true
                }
                None => false,
            }
        }

        fn post_delayed_task(&self, context: ContextId, task: Task, delay: Duration) {
            let timeline = lock(&self.contexts).get(&context).cloned();
            match timeline {
                Some(timeline) => timeline.post_delayed_task(task, delay),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%context, "dropping task posted to a dead context");
                }
            }
        }

        fn post_delayed_task_on_worker(&self, task: Task, delay: Duration) {
            self.worker.post_delayed_task(task, delay);
        }
    }

}

/// Tokio-backed implementation (requires the `async-scheduler` feature).
#[cfg(feature = "async-scheduler")]
mod async_impl {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use tokio::runtime::Handle;
    use tokio::task::AbortHandle;

    use pagepool_core::id::ContextId;
    use pagepool_core::platform::{Platform, Task, TaskRunner};

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns each delayed task on the runtime and keeps its abort handle.
    pub struct TokioTimeline {
        runtime: Handle,
        tasks: Mutex<Vec<AbortHandle>>,
    }

    impl TokioTimeline {
        fn new(runtime: Handle) -> Self {
            Self {
                runtime,
                tasks: Mutex::new(Vec::new()),
            }
        }

        fn abort_all(&self) -> usize {
            let tasks = std::mem::take(&mut *lock(&self.tasks));
            let mut aborted = 0;
            for task in tasks {
                if !task.is_finished() {
                    task.abort();
                    aborted += 1;
                }
            }
            aborted
        }

        pub fn pending(&self) -> usize {
            lock(&self.tasks).iter().filter(|t| !t.is_finished()).count()
        }
    }

    impl TaskRunner for TokioTimeline {
        fn post_delayed_task(&self, task: Task, delay: Duration) {
            let handle = self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
            let mut tasks = lock(&self.tasks);
            tasks.retain(|t| !t.is_finished());
            tasks.push(handle.abort_handle());
        }
    }

    pub struct TokioContextGroup {
        runtime: Handle,
        next_id: AtomicU64,
        contexts: Mutex<BTreeMap<ContextId, Arc<TokioTimeline>>>,
        worker: TokioTimeline,
    }

    /// Like [`TokioContextGroup::new`], panics outside a tokio runtime.
    impl Default for TokioContextGroup {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TokioContextGroup {
        /// Must be called from within a tokio runtime.
        pub fn new() -> Self {
            Self::with_handle(Handle::current())
        }

        pub fn with_handle(runtime: Handle) -> Self {
            Self {
                worker: TokioTimeline::new(runtime.clone()),
                runtime,
                next_id: AtomicU64::new(1),
                contexts: Mutex::new(BTreeMap::new()),
            }
        }

        pub fn create_context(&self) -> ContextId {
            let id = ContextId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let timeline = Arc::new(TokioTimeline::new(self.runtime.clone()));
            lock(&self.contexts).insert(id, timeline);
            id
        }

        /// Remove `context` and abort its pending tasks. Returns how many
        /// were still pending.
        pub fn remove_context(&self, context: ContextId) -> usize {
            let timeline = lock(&self.contexts).remove(&context);
            timeline.map_or(0, |t| t.abort_all())
        }

        pub fn pending_tasks(&self, context: ContextId) -> usize {
            lock(&self.contexts).get(&context).map_or(0, |t| t.pending())
        }

        pub fn pending_worker_tasks(&self) -> usize {
            self.worker.pending()
        }
    }

    impl Platform for TokioContextGroup {
        fn find_another_context_locked(
            &self,
            excluding: ContextId,
            schedule: &mut dyn FnMut(ContextId, &dyn TaskRunner),
        ) -> bool {
            let contexts = lock(&self.contexts);
            match contexts.iter().find(|(id, _)| **id != excluding) {
                Some((id, timeline)) => {
                    schedule(*id, &**timeline);
                    true
                }
                None => false,
            }
        }

        fn post_delayed_task(&self, context: ContextId, task: Task, delay: Duration) {
            let timeline = lock(&self.contexts).get(&context).cloned();
            if let Some(timeline) = timeline {
                timeline.post_delayed_task(task, delay);
            }
        }

        fn post_delayed_task_on_worker(&self, task: Task, delay: Duration) {
            self.worker.post_delayed_task(task, delay);
        }
    }

}
