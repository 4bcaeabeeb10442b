//! Task queue adapters.

pub mod memory;
pub mod redis;

pub use memory::InMemoryTaskQueue;
pub use redis::RedisTaskQueue;
