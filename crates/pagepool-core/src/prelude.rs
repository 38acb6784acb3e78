//! Convenient re-exports for downstream crates.

pub use crate::chunk::{ChunkSource, PageChunk, SizedChunk};
pub use crate::config::PoolConfig;
pub use crate::error::{Error, Result};
pub use crate::id::ContextId;
pub use crate::platform::{Platform, Task, TaskRunner};
pub use crate::time::{LogicalClock, LogicalTime};
