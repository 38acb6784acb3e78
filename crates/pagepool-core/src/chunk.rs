//! Interfaces for the memory being pooled.
//!
//! The pool never maps or unmaps anything itself. It holds descriptors handed
//! in by the heap manager and gives them back to a [`ChunkSource`] when they
//! are evicted.

/// A descriptor that knows how many bytes it covers.
pub trait SizedChunk: Send + 'static {
    fn size(&self) -> usize;
}

/// A regular (fixed-size) page descriptor.
///
/// The predicates only feed debug-build admission checks: pooled pages must
/// be plain data pages with every slot already cleared.
pub trait PageChunk: SizedChunk {
    /// Size every regular page is expected to have.
    const PAGE_SIZE: usize;

    fn is_large_page(&self) -> bool {
        false
    }

    fn is_trusted(&self) -> bool {
        false
    }

    fn is_executable(&self) -> bool {
        false
    }

    /// True while the page still records references into the managed heap.
    fn contains_any_slots(&self) -> bool {
        false
    }
}

/// The heap manager's side of the pool: the descriptor types, and the
/// release actions invoked when the pool finally lets go of an entry.
///
/// Release actions are called outside every pool lock and may be slow
/// (they typically end in an unmap syscall).
pub trait ChunkSource: Send + Sync + 'static {
    type Page: PageChunk;
    type LargePage: SizedChunk;
    /// An uncommitted address-range reservation. Dropping it releases the
    /// range, so it needs no separate release action.
    type Reservation: Send + 'static;

    fn delete_page(&self, page: Self::Page);

    fn delete_large_page(&self, page: Self::LargePage);
}
