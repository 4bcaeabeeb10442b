//! Task store adapters.

pub mod memory;
pub mod redis;
pub mod sqlite;

pub use memory::InMemoryTaskStore;
pub use redis::RedisTaskStore;
pub use sqlite::SqliteTaskStore;
