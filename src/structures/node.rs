use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

/// Hazard state of a node that is free to be handed out.
pub const NEUTRAL: isize = 0;

/// Offset applied when a node is retired. Far enough below zero that any
/// number of racing marks still leaves the counter negative.
pub const RECYCLED: isize = isize::MIN / 2;

/// Per-node counter used to detect readers racing with retirement.
pub struct HazardCounter {
    count: AtomicIsize,
}

impl HazardCounter {
    pub fn new(initial: isize) -> Self {
        HazardCounter {
            count: AtomicIsize::new(initial),
        }
    }

    /// Marks the node as being inspected. Returns `false` if the node has
    /// already been retired; the caller must still `unmark`.
    pub fn mark(&self) -> bool {
        self.count.fetch_add(1, Ordering::AcqRel) + 1 >= 0
    }

    pub fn unmark(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Shifts the counter into the recycled range. Marks still held by
    /// readers are preserved and drain back to exactly `RECYCLED`.
    pub fn retire(&self) {
        self.count.fetch_add(RECYCLED, Ordering::AcqRel);
    }

    /// Moves a fully drained, retired counter back to `NEUTRAL`.
    /// Fails while any stale mark is still outstanding.
    pub fn revive(&self) -> bool {
        self.count
            .compare_exchange(RECYCLED, NEUTRAL, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn load(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }
}

/// A queue cell. Plays the data holder role while linked behind the stub,
/// then the stub role once its payload has been taken.
pub struct Node<T> {
    next: AtomicPtr<Node<T>>,
    payload: UnsafeCell<MaybeUninit<T>>,
    pub hazard: HazardCounter,
}

impl<T> Node<T> {
    /// Allocates an unlinked node with an empty payload.
    pub fn alloc(hazard: isize) -> NonNull<Node<T>> {
        let node = Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            payload: UnsafeCell::new(MaybeUninit::uninit()),
            hazard: HazardCounter::new(hazard),
        });
        // Box::into_raw never returns null.
        unsafe { NonNull::new_unchecked(Box::into_raw(node)) }
    }

    /// Frees a node without touching its payload.
    ///
    /// # Safety
    /// `node` must come from `Node::alloc` and no other thread may hold it.
    pub unsafe fn dealloc(node: NonNull<Node<T>>) {
        drop(Box::from_raw(node.as_ptr()));
    }

    /// The following node, or `None` if nothing has been linked yet.
    pub fn successor(&self) -> Option<NonNull<Node<T>>> {
        NonNull::new(self.next.load(Ordering::Acquire))
    }

    /// Links `new` as the successor if there is none yet. On failure
    /// returns the successor some other thread linked first.
    pub fn link(&self, new: NonNull<Node<T>>) -> Result<(), NonNull<Node<T>>> {
        match self.next.compare_exchange(
            ptr::null_mut(),
            new.as_ptr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) => match NonNull::new(current) {
                Some(next) => Err(next),
                // A null link cannot make the exchange fail.
                None => Ok(()),
            },
        }
    }

    /// Prepares a freshly acquired node to carry `value`.
    ///
    /// # Safety
    /// The caller must own the node exclusively and it must not hold a live
    /// payload.
    pub unsafe fn fill(&self, value: T) {
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        (*self.payload.get()).write(value);
    }

    /// Moves the payload out, leaving the node as a stub.
    ///
    /// # Safety
    /// The payload must be initialized and taken at most once, by the thread
    /// that promoted this node to stub.
    pub unsafe fn take(&self) -> T {
        (*self.payload.get()).assume_init_read()
    }

    /// Drops the payload in place.
    ///
    /// # Safety
    /// Same as `take`.
    pub unsafe fn drop_payload(&self) {
        (*self.payload.get()).assume_init_drop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hazard_marks_on_live_node() {
        let h = HazardCounter::new(NEUTRAL);
        assert!(h.mark());
        assert!(h.mark());
        assert_eq!(h.load(), 2);
        h.unmark();
        h.unmark();
        assert_eq!(h.load(), NEUTRAL);
    }

    #[test]
    fn test_hazard_retire_with_outstanding_marks() {
        let h = HazardCounter::new(NEUTRAL);
        assert!(h.mark());
        h.retire();
        // Late reader sees the slot as retired.
        assert!(!h.mark());
        h.unmark();
        // Cannot revive while the first mark is still held.
        assert!(!h.revive());
        h.unmark();
        assert_eq!(h.load(), RECYCLED);
        assert!(h.revive());
        assert_eq!(h.load(), NEUTRAL);
    }

    #[test]
    fn test_link_once() {
        let a = Node::<u32>::alloc(NEUTRAL);
        let b = Node::<u32>::alloc(NEUTRAL);
        let c = Node::<u32>::alloc(NEUTRAL);
        unsafe {
            assert!(a.as_ref().successor().is_none());
            assert!(a.as_ref().link(b).is_ok());
            assert_eq!(a.as_ref().link(c), Err(b));
            assert_eq!(a.as_ref().successor(), Some(b));

            b.as_ref().fill(7);
            assert_eq!(b.as_ref().take(), 7);

            Node::dealloc(a);
            Node::dealloc(b);
            Node::dealloc(c);
        }
    }
}
