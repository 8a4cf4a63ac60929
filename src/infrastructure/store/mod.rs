//! Status and metadata store adapters

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Buffered change notifications per subscriber
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;
