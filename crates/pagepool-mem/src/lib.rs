#![forbid(unsafe_code)]
//! pagepool-mem: recycling pools for freed pages, zone reservations, and
//! large pages.
//!
//! Implements the pool on top of the interfaces in `pagepool-core`. Release
//! actions (the expensive part: unmapping) never run while a pool lock is
//! held; every eviction detaches what it frees first and drops it after the
//! guard is gone.

pub mod handle;
pub mod large;
pub mod pool;
pub mod tiered;
pub mod tracking;

pub use handle::PooledChunk;
pub use large::LargePagePool;
pub use pool::{PagePool, TearDownOutcome};
pub use tiered::TieredPool;
pub use tracking::{PoolStats, ReleaseCounters, ReleaseReport};
