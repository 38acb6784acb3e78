//! Move-only owning handle for pooled memory.
//!
//! A `PooledChunk` is the only owner of its chunk. Dropping it runs the
//! release action exactly once; [`PooledChunk::into_inner`] hands the chunk
//! back without releasing it (the pool is giving it to a caller for reuse).

use std::fmt;
use std::ops::Deref;

type ReleaseFn<T> = Box<dyn FnOnce(T) + Send + 'static>;

pub struct PooledChunk<T: Send + 'static> {
    // Both are `Some` from construction until `Drop` or `into_inner`.
    chunk: Option<T>,
    release: Option<ReleaseFn<T>>,
}

impl<T: Send + 'static> PooledChunk<T> {
    pub fn new(chunk: T, release: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            chunk: Some(chunk),
            release: Some(Box::new(release)),
        }
    }

    /// A handle whose release action is simply dropping the chunk, for types
    /// that free themselves (address-range reservations).
    pub fn dropping(chunk: T) -> Self {
        Self::new(chunk, drop)
    }

    /// Take the chunk out without running the release action.
    pub fn into_inner(mut self) -> T {
        self.release = None;
        match self.chunk.take() {
            Some(chunk) => chunk,
            None => unreachable!("PooledChunk without a chunk"),
        }
    }
}

impl<T: Send + 'static> Deref for PooledChunk<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.chunk {
            Some(chunk) => chunk,
            None => unreachable!("PooledChunk without a chunk"),
        }
    }
}

impl<T: Send + 'static> Drop for PooledChunk<T> {
    fn drop(&mut self) {
        if let (Some(chunk), Some(release)) = (self.chunk.take(), self.release.take()) {
            // NOTE: do not log here to keep drop path fast.
            release(chunk);
        }
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for PooledChunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledChunk").field(&self.chunk).finish()
    }
}
