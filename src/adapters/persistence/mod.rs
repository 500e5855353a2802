//! Model store implementations.

pub mod memory_repo;
pub mod sqlite_repo;

pub use memory_repo::MemoryStore;
pub use sqlite_repo::SqliteRepo;
