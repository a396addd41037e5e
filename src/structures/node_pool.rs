use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use crossbeam_epoch::Guard;

use super::node::{Node, NEUTRAL, RECYCLED};

/// How many pooled nodes `acquire` inspects before falling back to a fresh
/// allocation.
const ACQUIRE_SPINS: usize = 4;

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Nodes obtained from the allocator.
    pub allocated: usize,
    /// Nodes handed out again from the free list.
    pub reused: usize,
    /// Nodes returned to the pool.
    pub released: usize,
    /// Released nodes freed because the pool was full.
    pub freed: usize,
    /// Nodes currently sitting in the free list.
    pub idle: usize,
}

/// Free list of queue nodes.
///
/// Nodes only enter the free list through `retire`, which waits for the
/// epoch collector to confirm that no pinned thread can still hold the old
/// address. A node is handed out again only when its hazard counter has
/// drained back to exactly `RECYCLED`.
pub struct NodePool<T> {
    free: SegQueue<NonNull<Node<T>>>,
    idle: AtomicUsize,
    max_idle: Option<usize>,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    released: AtomicUsize,
    freed: AtomicUsize,
}

unsafe impl<T: Send> Send for NodePool<T> {}
unsafe impl<T: Send> Sync for NodePool<T> {}

impl<T> NodePool<T> {
    pub fn new(max_idle: Option<usize>) -> Self {
        NodePool {
            free: SegQueue::new(),
            idle: AtomicUsize::new(0),
            max_idle,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
        }
    }

    /// Allocates up to `count` nodes into the free list, respecting `max_idle`.
    pub fn prefill(&self, count: usize) {
        let mut added = 0;
        while added < count && self.reserve_idle() {
            self.free.push(Node::alloc(RECYCLED));
            added += 1;
        }
        self.allocated.fetch_add(added, Ordering::Relaxed);
        tracing::trace!(added, "prefilled node pool");
    }

    /// Claims one free-list slot. `idle` is bumped before the push, so the
    /// free list never holds more than `max_idle` nodes.
    fn reserve_idle(&self) -> bool {
        match self.max_idle {
            Some(max) => self
                .idle
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_ok(),
            None => {
                self.idle.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Returns a node with a neutral hazard state, reusing a pooled one when
    /// possible.
    pub fn acquire(&self) -> NonNull<Node<T>> {
        for _ in 0..ACQUIRE_SPINS {
            let Some(node) = self.free.pop() else {
                break;
            };
            // Only this thread holds `node` now; the free list gave it up.
            if unsafe { node.as_ref() }.hazard.revive() {
                self.idle.fetch_sub(1, Ordering::Relaxed);
                self.reused.fetch_add(1, Ordering::Relaxed);
                return node;
            }
            // A stale mark is still draining. Give it back for later.
            self.free.push(node);
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("node pool miss, allocating");
        Node::alloc(NEUTRAL)
    }

    /// Hands a dead node back to the free list, or frees it when the pool
    /// already retains `max_idle` nodes.
    ///
    /// # Safety
    /// No thread other than the caller may access `node` any longer, and its
    /// payload must already have been moved out.
    pub unsafe fn release(&self, node: NonNull<Node<T>>) {
        self.released.fetch_add(1, Ordering::Relaxed);

        if !self.reserve_idle() {
            self.freed.fetch_add(1, Ordering::Relaxed);
            Node::dealloc(node);
            return;
        }

        debug_assert!(node.as_ref().hazard.load() < 0);
        self.free.push(node);
    }

    /// Marks `node` as recycled and schedules its return to the pool once
    /// every thread pinned at this point has unpinned.
    ///
    /// # Safety
    /// `node` must have just been unlinked from the queue by the caller and
    /// its payload must already have been moved out.
    pub unsafe fn retire(self: &Arc<Self>, node: NonNull<Node<T>>, guard: &Guard) {
        node.as_ref().hazard.retire();
        let pool = Arc::clone(self);
        guard.defer_unchecked(move || unsafe { pool.release(node) });
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
        }
    }
}

impl<T> fmt::Debug for NodePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("max_idle", &self.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T> Drop for NodePool<T> {
    fn drop(&mut self) {
        let mut count = 0;
        while let Some(node) = self.free.pop() {
            unsafe { Node::dealloc(node) };
            count += 1;
        }
        tracing::debug!(count, "node pool dropped");
    }
}
