pub mod backend;
pub mod error;
pub mod sqlite;
pub mod store;

pub use backend::{KvBackend, NullBackend};
pub use error::MemoryError;
pub use sqlite::SqliteBackend;
pub use store::{slugify, Ack, MemoryStore, LATEST_CONTEXT_KEY};
