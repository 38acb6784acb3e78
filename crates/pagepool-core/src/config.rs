//! Pool configuration that embedders can serialize/deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MB: usize = 1024 * 1024;

/// Delay before a teardown handoff task evicts the shared pools.
pub const RELEASE_TASK_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Whether a tearing-down context hands its pooled memory to the shared
    /// pool for other contexts, instead of releasing it right away.
    pub share_memory_on_teardown: bool,

    /// Upper bound on the summed size of pooled large pages, in MiB.
    pub max_large_page_pool_size_mb: usize,

    /// Seconds before admitted large pages are evicted. Zero disables the
    /// deferred eviction (pages then stay until an explicit release).
    pub large_page_pool_timeout_secs: u64,

    /// Post large-page eviction onto the admitting context instead of a
    /// worker thread.
    pub single_threaded: bool,

    /// Log a line for every windowed shared-pool eviction.
    pub trace_pool: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            share_memory_on_teardown: false,
            max_large_page_pool_size_mb: 32,
            large_page_pool_timeout_secs: 3,
            single_threaded: false,
            trace_pool: false,
        }
    }
}

impl PoolConfig {
    /// Apply environment overrides over the defaults.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_bool("PAGEPOOL_SHARE_MEMORY_ON_TEARDOWN") {
            cfg.share_memory_on_teardown = v;
        }

        if let Ok(s) = std::env::var("PAGEPOOL_MAX_LARGE_PAGE_POOL_SIZE_MB") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_large_page_pool_size_mb = v;
            }
        }

        if let Ok(s) = std::env::var("PAGEPOOL_LARGE_PAGE_POOL_TIMEOUT_SECS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.large_page_pool_timeout_secs = v;
            }
        }

        if let Some(v) = env_bool("PAGEPOOL_SINGLE_THREADED") {
            cfg.single_threaded = v;
        }

        if let Some(v) = env_bool("PAGEPOOL_TRACE") {
            cfg.trace_pool = v;
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_large_page_pool_size_mb.checked_mul(MB).is_none() {
            return Err(Error::Config(format!(
                "max_large_page_pool_size_mb={} overflows a byte count",
                self.max_large_page_pool_size_mb
            )));
        }
        Ok(())
    }

    /// Large-pool capacity in bytes.
    pub fn max_large_page_pool_bytes(&self) -> usize {
        self.max_large_page_pool_size_mb.saturating_mul(MB)
    }

    /// `None` when deferred large-page eviction is disabled.
    pub fn large_page_pool_timeout(&self) -> Option<Duration> {
        (self.large_page_pool_timeout_secs > 0)
            .then(|| Duration::from_secs(self.large_page_pool_timeout_secs))
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let s = std::env::var(key).ok()?;
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
