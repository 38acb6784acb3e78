#![forbid(unsafe_code)]
//! pagepool-core: identifiers, logical time, configuration, and the
//! interfaces the pool expects from its surroundings.
//!
//! The concrete pools live in `pagepool-mem`; reference task schedulers live
//! in `pagepool-exec`. Nothing in here allocates, maps, or frees memory.

pub mod chunk;
pub mod config;
pub mod error;
pub mod id;
pub mod platform;
pub mod prelude;
pub mod time;
