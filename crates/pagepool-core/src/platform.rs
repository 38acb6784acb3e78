//! Context registry and delayed-task posting.
//!
//! Implemented by `pagepool-exec` (and by embedders). A task posted to a
//! context runs on that context's timeline and is dropped without running if
//! the context goes away first; the pool relies on that and keeps no
//! cancellation handles of its own.

use std::time::Duration;

use crate::id::ContextId;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task later.
pub trait TaskRunner: Send + Sync {
    fn post_delayed_task(&self, task: Task, delay: Duration);
}

/// Registry of live contexts plus the ability to post work onto them.
pub trait Platform: Send + Sync + 'static {
    /// Look for a live context other than `excluding`. If one exists, call
    /// `schedule` with its id and task runner while the registry guarantees
    /// it stays alive, and return true. Return false if there is none.
    ///
    /// `schedule` must not call back into the registry.
    fn find_another_context_locked(
        &self,
        excluding: ContextId,
        schedule: &mut dyn FnMut(ContextId, &dyn TaskRunner),
    ) -> bool;

    /// Post onto `context`'s own timeline. Silently dropped if the context
    /// is not live.
    fn post_delayed_task(&self, context: ContextId, task: Task, delay: Duration);

    /// Post onto a background worker not bound to any context.
    fn post_delayed_task_on_worker(&self, task: Task, delay: Duration);
}
