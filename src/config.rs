/// Tuning knobs for a [`Queue`](crate::Queue).
///
/// ```
/// use lfqueue::{Queue, QueueConfig};
///
/// let queue: Queue<u32> = Queue::with_config(QueueConfig::new().prefill(64).max_idle(1024));
/// queue.put(1);
/// assert_eq!(queue.get(), Some(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Nodes allocated into the pool when the queue is created.
    pub prefill: usize,
    /// Upper bound on nodes the pool keeps around. `None` keeps every node.
    pub max_idle: Option<usize>,
    /// Spin with exponential backoff after a lost CAS.
    pub backoff: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            prefill: 0,
            max_idle: None,
            backoff: true,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefill(mut self, nodes: usize) -> Self {
        self.prefill = nodes;
        self
    }

    pub fn max_idle(mut self, nodes: usize) -> Self {
        self.max_idle = Some(nodes);
        self
    }

    pub fn backoff(mut self, enabled: bool) -> Self {
        self.backoff = enabled;
        self
    }
}
