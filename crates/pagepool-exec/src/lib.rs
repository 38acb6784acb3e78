#![forbid(unsafe_code)]
//! pagepool-exec: reference implementations of the `Platform` interface.
//!
//! `ContextGroup` is a deterministic registry whose timelines only move when
//! the embedder calls `advance`. With `async-scheduler`, `TokioContextGroup`
//! runs the same contract on a tokio runtime.

pub mod scheduler;

pub use scheduler::*;
