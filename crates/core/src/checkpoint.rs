//! CheckpointStore trait: the persistence boundary for threads.
//!
//! Maps a thread identifier to its ordered message sequence. The turn
//! runner reads the full sequence at turn start and appends new messages
//! at every state transition; it never learns whether the backend is
//! volatile memory or durable storage.

use crate::error::CheckpointError;
use crate::message::{Message, ThreadId};
use async_trait::async_trait;

/// The persistence boundary mapping thread identifiers to message sequences.
///
/// Contract:
/// - `load` returns the empty sequence for an unseen thread id.
/// - `append` is atomic with respect to concurrent appends to the *same*
///   thread id: no interleaving that could duplicate or drop a message.
///   Appends to *different* thread ids must not block each other.
/// - `list_thread_ids` enumerates every id ever appended to.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Load the full ordered message sequence for a thread.
    async fn load(&self, thread_id: &ThreadId)
        -> std::result::Result<Vec<Message>, CheckpointError>;

    /// Append messages to a thread, creating it if unseen.
    async fn append(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> std::result::Result<(), CheckpointError>;

    /// Enumerate all known thread identifiers.
    async fn list_thread_ids(&self) -> std::result::Result<Vec<ThreadId>, CheckpointError>;
}
