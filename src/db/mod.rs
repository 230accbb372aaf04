//! Entities and storage ports.

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;
pub use store::*;
