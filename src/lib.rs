//! A lock-free, multi-producer multi-consumer FIFO queue that recycles its
//! nodes.
//!
//! [`Queue`] is a Michael–Scott queue: a stub node always sits at `head`,
//! producers link new nodes after `tail` with a compare-and-swap, and
//! consumers advance `head` by one node per dequeue. Instead of freeing the
//! node that falls off the front, the queue hands it to a
//! [`NodePool`](structures::node_pool::NodePool) so steady-state traffic
//! does not touch the allocator.
//!
//! Recycling memory under concurrent readers needs two guards:
//!
//! - every retired node re-enters the pool through the `crossbeam-epoch`
//!   collector, so it is only handed out again once no pinned thread can
//!   still hold its old address;
//! - each node carries a hazard counter that readers mark before following
//!   `next`. A negative counter tells the reader the slot has been retired
//!   and it must restart from a fresh `head`.
//!
//! ```
//! use lfqueue::Queue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(Queue::new());
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             queue.put(i);
//!         }
//!     })
//! };
//! producer.join().unwrap();
//!
//! let drained: Vec<_> = queue.try_iter().collect();
//! assert_eq!(drained, (0..100).collect::<Vec<_>>());
//! assert_eq!(queue.get(), None);
//! ```

mod config;
pub mod structures;

pub use config::QueueConfig;
pub use structures::node_pool::PoolStats;
pub use structures::recycling_queue::{Queue, TryIter};
