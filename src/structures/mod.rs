pub mod node;
pub mod node_pool;
pub mod recycling_queue;
