//! Thread checkpoint stores for Chatloom.
//!
//! A checkpoint store persists every message of every conversation thread
//! so a thread can be resumed across restarts. Two backends:
//! - `InMemoryStore`: process-local, used for tests and ephemeral runs
//! - `SqliteStore`: durable single-file store, the default

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;
