//! Shared fixtures: a chunk source that records every release.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pagepool_core::chunk::{ChunkSource, PageChunk, SizedChunk};
use pagepool_core::config::PoolConfig;
use pagepool_exec::ContextGroup;
use pagepool_mem::PagePool;

pub const PAGE_SIZE: usize = 256 * 1024;
pub const MB: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    pub id: u64,
}

impl SizedChunk for Page {
    fn size(&self) -> usize {
        PAGE_SIZE
    }
}

impl PageChunk for Page {
    const PAGE_SIZE: usize = PAGE_SIZE;
}

#[derive(Debug, PartialEq, Eq)]
pub struct LargePage {
    pub id: u64,
    pub size: usize,
}

impl SizedChunk for LargePage {
    fn size(&self) -> usize {
        self.size
    }
}

/// Records its id into the source's ledger when dropped.
#[derive(Debug)]
pub struct Reservation {
    pub id: u64,
    ledger: Arc<Mutex<Vec<u64>>>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.lock().unwrap().push(self.id);
    }
}

#[derive(Default)]
pub struct RecordingSource {
    next_id: AtomicU64,
    pub pages: Arc<Mutex<Vec<u64>>>,
    pub large_pages: Arc<Mutex<Vec<u64>>>,
    pub reservations: Arc<Mutex<Vec<u64>>>,
}

impl RecordingSource {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn page(&self) -> Page {
        Page { id: self.next() }
    }

    pub fn large_page(&self, size: usize) -> LargePage {
        LargePage {
            id: self.next(),
            size,
        }
    }

    pub fn reservation(&self) -> Reservation {
        Reservation {
            id: self.next(),
            ledger: Arc::clone(&self.reservations),
        }
    }

    pub fn released_pages(&self) -> Vec<u64> {
        self.pages.lock().unwrap().clone()
    }

    pub fn released_large_pages(&self) -> Vec<u64> {
        self.large_pages.lock().unwrap().clone()
    }

    pub fn released_reservations(&self) -> Vec<u64> {
        self.reservations.lock().unwrap().clone()
    }
}

impl ChunkSource for RecordingSource {
    type Page = Page;
    type LargePage = LargePage;
    type Reservation = Reservation;

    fn delete_page(&self, page: Page) {
        self.pages.lock().unwrap().push(page.id);
    }

    fn delete_large_page(&self, page: LargePage) {
        self.large_pages.lock().unwrap().push(page.id);
    }
}

pub type TestPool = PagePool<RecordingSource, ContextGroup>;

pub struct Harness {
    pub pool: TestPool,
    pub source: Arc<RecordingSource>,
    pub group: Arc<ContextGroup>,
}

pub fn harness(config: PoolConfig) -> Harness {
    let source = Arc::new(RecordingSource::default());
    let group = Arc::new(ContextGroup::new());
    let pool = PagePool::new(config, Arc::clone(&source), Arc::clone(&group));
    Harness {
        pool,
        source,
        group,
    }
}

pub fn sharing() -> PoolConfig {
    PoolConfig {
        share_memory_on_teardown: true,
        ..Default::default()
    }
}
