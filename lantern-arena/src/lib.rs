//! Pooled arena allocation and the dataflow collections built on top of it.
//!
//! A method compilation allocates a large number of short-lived graph nodes
//! and bit sets.  All of that transient memory is drawn from one
//! [`ArenaAllocator`] owned by the compilation unit; when the unit is dropped
//! the arenas go back to a shared [`ArenaPool`] and the next method reuses
//! them without touching the system allocator.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod array;
mod bitvec;

pub use array::GrowableArray;
pub use bitvec::BitVector;

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::trace;

/// A contiguous zero-initialized byte region owned by the pool or by one
/// allocator at a time.
pub struct Arena {
    storage: Box<[u8]>,
    bytes_allocated: usize,
}

impl Arena {
    /// Default region size.  Large enough that typical methods never chain a
    /// second arena.
    pub const DEFAULT_SIZE: usize = 128 * 1024;

    fn with_capacity(size: usize) -> Self {
        Arena {
            storage: vec![0u8; size].into_boxed_slice(),
            bytes_allocated: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// High-water mark of bytes handed out from this arena.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Capacity not yet handed out.
    pub fn remaining_space(&self) -> usize {
        self.capacity() - self.bytes_allocated
    }

    // Zero the used span so a reused arena hands out zeroed memory again.
    fn reset(&mut self) {
        if self.bytes_allocated > 0 {
            self.storage[..self.bytes_allocated].fill(0);
            self.bytes_allocated = 0;
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("bytes_allocated", &self.bytes_allocated)
            .finish()
    }
}

/// Shared free list of arenas, reused across method compilations.
///
/// One pool serves every compiler worker thread; the mutex is only held for
/// the push/pop itself.
#[derive(Default)]
pub struct ArenaPool {
    free: Mutex<Vec<Arena>>,
}

impl ArenaPool {
    /// Create an empty pool.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take an arena with capacity of at least `min_size`, zero-initialized.
    ///
    /// A pooled arena is reused only when its capacity suffices; otherwise a
    /// fresh one is allocated.
    pub fn acquire(&self, min_size: usize) -> Arena {
        let reused = {
            let mut free = self.free.lock().expect("arena pool poisoned");
            match free.last() {
                Some(arena) if arena.capacity() >= min_size => free.pop(),
                _ => None,
            }
        };
        match reused {
            Some(arena) => {
                trace!(capacity = arena.capacity(), "reusing pooled arena");
                arena
            }
            None => {
                let arena = Arena::with_capacity(min_size.max(Arena::DEFAULT_SIZE));
                trace!(capacity = arena.capacity(), "allocated fresh arena");
                arena
            }
        }
    }

    /// Return an arena to the free list.  The used span is zeroed here so
    /// `acquire` never hands out dirty memory.
    pub fn release(&self, mut arena: Arena) {
        trace!(
            capacity = arena.capacity(),
            used = arena.bytes_allocated(),
            "arena back to pool"
        );
        arena.reset();
        let mut free = self.free.lock().expect("arena pool poisoned");
        free.push(arena);
    }

    /// Number of arenas currently sitting in the free list.
    pub fn idle_arenas(&self) -> usize {
        self.free.lock().expect("arena pool poisoned").len()
    }
}

/// What a piece of arena memory is used for.  Only affects accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter, strum::Display)]
#[allow(missing_docs)]
pub enum AllocKind {
    Misc,
    BasicBlock,
    Lir,
    Mir,
    DfInfo,
    GrowableArray,
    GrowableBitMap,
    SsaToVRegMap,
    DebugInfo,
    Successor,
    RegAlloc,
    Data,
    Preds,
}

/// Number of [`AllocKind`] variants.
pub const NUM_ALLOC_KINDS: usize = 13;

/// Handle to a span of bytes inside an [`ArenaAllocator`].
///
/// Handles stay valid for the life of the allocator; arena memory is never
/// reclaimed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaRef {
    arena: u32,
    offset: u32,
    len: u32,
}

impl ArenaRef {
    /// Length of the span in bytes (after rounding up to 4).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when the span is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator over a chain of pooled arenas.
///
/// `alloc` never fails: when the current arena is exhausted a new one is
/// chained in.  Nothing is freed until the allocator is dropped, at which
/// point every arena goes back to the pool.
pub struct ArenaAllocator {
    pool: Arc<ArenaPool>,
    arenas: Vec<Arena>,
    ptr: usize,
    end: usize,
    num_allocations: usize,
    alloc_stats: [usize; NUM_ALLOC_KINDS],
}

impl ArenaAllocator {
    /// Create an allocator drawing from `pool`.  No arena is acquired until
    /// the first allocation.
    pub fn new(pool: Arc<ArenaPool>) -> Self {
        ArenaAllocator {
            pool,
            arenas: Vec::new(),
            ptr: 0,
            end: 0,
            num_allocations: 0,
            alloc_stats: [0; NUM_ALLOC_KINDS],
        }
    }

    /// Allocate `bytes` (rounded up to 4) of zeroed memory.
    pub fn alloc(&mut self, bytes: usize, kind: AllocKind) -> ArenaRef {
        let bytes = (bytes + 3) & !3;
        if self.ptr + bytes > self.end {
            self.obtain_new_arena(bytes);
        }
        self.alloc_stats[kind as usize] += bytes;
        self.num_allocations += 1;
        let r = ArenaRef {
            arena: (self.arenas.len() - 1) as u32,
            offset: self.ptr as u32,
            len: bytes as u32,
        };
        self.ptr += bytes;
        r
    }

    /// Account for `bytes` of typed-pool storage under `kind`.
    ///
    /// Node pools (MIR, basic blocks, LIR) hold their elements in plain
    /// vectors indexed by id rather than raw arena bytes; they report their
    /// footprint here so the memory dump covers every transient structure.
    pub fn charge(&mut self, kind: AllocKind, bytes: usize) {
        self.alloc_stats[kind as usize] += bytes;
        self.num_allocations += 1;
    }

    /// Read access to an allocated span.
    pub fn bytes(&self, r: ArenaRef) -> &[u8] {
        let arena = &self.arenas[r.arena as usize];
        &arena.storage[r.offset as usize..(r.offset + r.len) as usize]
    }

    /// Write access to an allocated span.
    pub fn bytes_mut(&mut self, r: ArenaRef) -> &mut [u8] {
        let arena = &mut self.arenas[r.arena as usize];
        &mut arena.storage[r.offset as usize..(r.offset + r.len) as usize]
    }

    /// Total bytes accounted across all kinds.
    pub fn bytes_allocated(&self) -> usize {
        self.alloc_stats.iter().sum()
    }

    /// Snapshot of the allocator statistics for diagnostics.
    pub fn mem_stats(&self) -> MemStats {
        let mut malloc_bytes = 0;
        let mut lost_bytes = self.end - self.ptr;
        for (i, arena) in self.arenas.iter().enumerate() {
            malloc_bytes += arena.capacity();
            if i + 1 != self.arenas.len() {
                lost_bytes += arena.remaining_space();
            }
        }
        MemStats {
            bytes_allocated: self.bytes_allocated(),
            malloc_bytes,
            lost_bytes,
            num_arenas: self.arenas.len(),
            num_allocations: self.num_allocations,
            alloc_stats: self.alloc_stats,
        }
    }

    fn obtain_new_arena(&mut self, allocation_size: usize) {
        self.update_bytes_allocated();
        let arena = self.pool.acquire(allocation_size.max(Arena::DEFAULT_SIZE));
        self.ptr = 0;
        self.end = arena.capacity();
        self.arenas.push(arena);
    }

    fn update_bytes_allocated(&mut self) {
        // Record how far we got so the pool knows how much to zero on reuse.
        if let Some(arena) = self.arenas.last_mut() {
            arena.bytes_allocated = self.ptr;
        }
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        self.update_bytes_allocated();
        for arena in self.arenas.drain(..) {
            self.pool.release(arena);
        }
    }
}

/// Memory usage summary of one [`ArenaAllocator`], displayable per kind.
#[derive(Debug, Clone)]
pub struct MemStats {
    /// Bytes handed out or charged.
    pub bytes_allocated: usize,
    /// Bytes reserved from the system.
    pub malloc_bytes: usize,
    /// Bytes reserved but unusable (tail fragments of full arenas).
    pub lost_bytes: usize,
    /// Arenas in the chain.
    pub num_arenas: usize,
    /// Individual allocations performed.
    pub num_allocations: usize,
    /// Per-kind byte totals, indexed by [`AllocKind`].
    pub alloc_stats: [usize; NUM_ALLOC_KINDS],
}

impl fmt::Display for MemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use strum::IntoEnumIterator;
        writeln!(
            f,
            "MEM: used: {}, allocated: {}, lost: {}",
            self.bytes_allocated, self.malloc_bytes, self.lost_bytes
        )?;
        if self.num_allocations != 0 {
            writeln!(
                f,
                "arenas: {}, allocations: {}, avg size: {}",
                self.num_arenas,
                self.num_allocations,
                self.bytes_allocated / self.num_allocations
            )?;
        }
        writeln!(f, "===== allocation by kind")?;
        for kind in AllocKind::iter() {
            writeln!(f, "{:<12} {:>10}", kind, self.alloc_stats[kind as usize])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zeroed_memory() {
        let pool = ArenaPool::new();
        let mut alloc = ArenaAllocator::new(pool);
        let r = alloc.alloc(100, AllocKind::Misc);
        assert_eq!(r.len(), 100);
        assert!(alloc.bytes(r).iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_rounds_up_to_word() {
        let pool = ArenaPool::new();
        let mut alloc = ArenaAllocator::new(pool);
        let r = alloc.alloc(5, AllocKind::Misc);
        assert_eq!(r.len(), 8);
        assert_eq!(alloc.bytes_allocated(), 8);
    }

    #[test]
    fn oversized_allocation_chains_a_bigger_arena() {
        let pool = ArenaPool::new();
        let mut alloc = ArenaAllocator::new(pool.clone());
        let big = Arena::DEFAULT_SIZE * 2;
        let _small = alloc.alloc(16, AllocKind::Misc);
        let r = alloc.alloc(big, AllocKind::Data);
        assert_eq!(r.len(), big);
        assert_eq!(alloc.mem_stats().num_arenas, 2);
    }

    #[test]
    fn pool_reuses_and_rezeroes() {
        let pool = ArenaPool::new();
        {
            let mut alloc = ArenaAllocator::new(pool.clone());
            let r = alloc.alloc(64, AllocKind::Misc);
            alloc.bytes_mut(r).fill(0xab);
        }
        assert_eq!(pool.idle_arenas(), 1);
        let mut alloc = ArenaAllocator::new(pool.clone());
        let r = alloc.alloc(64, AllocKind::Misc);
        assert!(alloc.bytes(r).iter().all(|&b| b == 0));
        drop(alloc);
        assert_eq!(pool.idle_arenas(), 1);
    }

    #[test]
    fn pool_skips_too_small_arena() {
        let pool = ArenaPool::new();
        pool.release(Arena::with_capacity(32));
        let arena = pool.acquire(Arena::DEFAULT_SIZE);
        assert!(arena.capacity() >= Arena::DEFAULT_SIZE);
        // The small arena stays in the pool untouched.
        assert_eq!(pool.idle_arenas(), 1);
    }

    #[test]
    fn stats_account_by_kind() {
        let pool = ArenaPool::new();
        let mut alloc = ArenaAllocator::new(pool);
        alloc.alloc(16, AllocKind::Mir);
        alloc.alloc(16, AllocKind::Mir);
        alloc.charge(AllocKind::BasicBlock, 40);
        let stats = alloc.mem_stats();
        assert_eq!(stats.alloc_stats[AllocKind::Mir as usize], 32);
        assert_eq!(stats.alloc_stats[AllocKind::BasicBlock as usize], 40);
        assert_eq!(stats.bytes_allocated, 72);
    }
}
