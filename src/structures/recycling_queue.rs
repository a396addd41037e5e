use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};
use std::sync::Arc;

use crossbeam::utils::{Backoff, CachePadded};
use crossbeam_epoch as epoch;

use super::node::Node;
use super::node_pool::{NodePool, PoolStats};
use crate::config::QueueConfig;

/// Unbounded lock-free MPMC FIFO queue whose nodes are recycled through a
/// [`NodePool`] instead of being freed on every `get`.
///
/// `head` always points at a stub node whose payload has been consumed;
/// the first live value sits in `head.next`. `tail` is a hint that is never
/// behind `head`.
pub struct Queue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    length: AtomicIsize,
    pool: Arc<NodePool<T>>,
    backoff: bool,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates an empty queue holding only its stub node.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let pool = Arc::new(NodePool::new(config.max_idle));
        pool.prefill(config.prefill);
        let stub = pool.acquire();

        Queue {
            head: CachePadded::new(AtomicPtr::new(stub.as_ptr())),
            tail: CachePadded::new(AtomicPtr::new(stub.as_ptr())),
            length: AtomicIsize::new(0),
            pool,
            backoff: config.backoff,
        }
    }

    /// Appends `value` at the tail. Never blocks.
    pub fn put(&self, value: T) {
        let node = self.pool.acquire();
        // Not yet published, so this thread owns it.
        unsafe { node.as_ref().fill(value) };

        let _guard = epoch::pin();
        let backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // Pinned: `tail` cannot re-enter the pool while we hold it.
            let tail_node = unsafe { &*tail };

            match tail_node.link(node) {
                Ok(()) => {
                    self.length.fetch_add(1, Ordering::Release);
                    self.tail
                        .compare_exchange(tail, node.as_ptr(), Ordering::Release, Ordering::Relaxed)
                        .ok();
                    return;
                }
                Err(next) => {
                    // Someone linked first; help swing the tail before retrying.
                    self.tail
                        .compare_exchange(tail, next.as_ptr(), Ordering::Release, Ordering::Relaxed)
                        .ok();
                    self.pause(&backoff);
                }
            }
        }
    }

    /// Removes the oldest value, or returns `None` if the queue was empty at
    /// the instant of the call. Never blocks.
    pub fn get(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            let head_node = unsafe { &*head };

            if !head_node.hazard.mark() {
                // Slot already retired behind our back; start over.
                head_node.hazard.unmark();
                self.pause(&backoff);
                continue;
            }

            let Some(next) = head_node.successor() else {
                head_node.hazard.unmark();
                return None;
            };

            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                // Tail is lagging; it must never point at a retired node.
                self.tail
                    .compare_exchange(tail, next.as_ptr(), Ordering::Release, Ordering::Relaxed)
                    .ok();
            }

            match self
                .head
                .compare_exchange(head, next.as_ptr(), Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.length.fetch_sub(1, Ordering::Release);
                    // Winning the CAS gives this thread sole claim on the payload.
                    let value = unsafe { next.as_ref().take() };
                    head_node.hazard.unmark();
                    unsafe { self.pool.retire(NonNull::from(head_node), &guard) };
                    return Some(value);
                }
                Err(_) => {
                    head_node.hazard.unmark();
                    self.pause(&backoff);
                }
            }
        }
    }

    /// Best-effort number of queued values. Exact only when no `put` or
    /// `get` is in flight.
    pub fn len(&self) -> usize {
        // `get` can decrement before the matching `put` increments.
        self.length.load(Ordering::Acquire).max(0) as usize
    }

    /// Whether `head` had no successor at the instant of the call.
    pub fn is_empty(&self) -> bool {
        let _guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire);
        unsafe { &*head }.successor().is_none()
    }

    /// Iterator that keeps calling [`get`](Self::get) until it returns `None`.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { queue: self }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn pause(&self, backoff: &Backoff) {
        if self.backoff {
            backoff.spin();
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Extend<T> for Queue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.put(value);
        }
    }
}

impl<T> FromIterator<T> for Queue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Queue::new();
        queue.extend(iter);
        queue
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("pool", &self.pool.stats())
            .finish()
    }
}

/// Drops every undelivered payload and frees the nodes still linked into the
/// queue. Nodes whose return to the pool is still pending in the epoch
/// collector are freed when that deferred release runs and the last handle
/// to the pool goes away, which the collector does not guarantee before
/// process exit.
impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut undelivered = 0usize;
        let head = *self.head.get_mut();
        unsafe {
            // The stub's payload was already taken (or never written).
            let mut current = (*head).successor();
            Node::dealloc(NonNull::new_unchecked(head));
            while let Some(node) = current {
                node.as_ref().drop_payload();
                undelivered += 1;
                current = node.as_ref().successor();
                Node::dealloc(node);
            }
        }
        tracing::debug!(undelivered, pool = ?self.pool.stats(), "queue dropped");
    }
}

/// Draining iterator returned by [`Queue::try_iter`]. Yields again after
/// `None` if more values are put.
pub struct TryIter<'a, T> {
    queue: &'a Queue<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.get()
    }
}
