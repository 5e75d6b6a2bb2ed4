//! In-memory store, for testing and ephemeral sessions.

use async_trait::async_trait;
use chatloom_core::error::CheckpointError;
use chatloom_core::message::{Message, ThreadId};
use chatloom_core::CheckpointStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// An in-memory store keeping each thread's messages in a Vec.
///
/// Each thread has its own lock, so appends to distinct threads never
/// block each other while appends to the same thread serialize.
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, Arc<Mutex<Vec<Message>>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }

    async fn thread(&self, thread_id: &ThreadId) -> Arc<Mutex<Vec<Message>>> {
        if let Some(existing) = self.threads.read().await.get(thread_id.as_str()) {
            return existing.clone();
        }
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<Message>, CheckpointError> {
        match self.threads.read().await.get(thread_id.as_str()) {
            Some(thread) => Ok(thread.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn append(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), CheckpointError> {
        if messages.is_empty() {
            return Ok(());
        }
        let thread = self.thread(thread_id).await;
        thread.lock().await.extend_from_slice(messages);
        Ok(())
    }

    async fn list_thread_ids(&self) -> Result<Vec<ThreadId>, CheckpointError> {
        let threads = self.threads.read().await;
        let mut ids: Vec<ThreadId> = threads.keys().map(|k| ThreadId::from(k.as_str())).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_unknown_thread_is_empty() {
        let store = InMemoryStore::new();
        let messages = store.load(&ThreadId::from("nope")).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn append_then_load() {
        let store = InMemoryStore::new();
        let thread = ThreadId::from("t1");

        store
            .append(&thread, &[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn append_extends_existing_history() {
        let store = InMemoryStore::new();
        let thread = ThreadId::from("t1");

        store.append(&thread, &[Message::user("one")]).await.unwrap();
        let before = store.load(&thread).await.unwrap();

        store
            .append(&thread, &[Message::assistant("two")])
            .await
            .unwrap();
        let after = store.load(&thread).await.unwrap();

        // Existing history is a strict prefix of the new one
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[1].content, "two");
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let store = InMemoryStore::new();
        store
            .append(&ThreadId::from("a"), &[Message::user("for a")])
            .await
            .unwrap();
        store
            .append(&ThreadId::from("b"), &[Message::user("for b")])
            .await
            .unwrap();

        let a = store.load(&ThreadId::from("a")).await.unwrap();
        let b = store.load(&ThreadId::from("b")).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].content, "for a");
        assert_eq!(b[0].content, "for b");
    }

    #[tokio::test]
    async fn list_thread_ids_sorted() {
        let store = InMemoryStore::new();
        store
            .append(&ThreadId::from("zeta"), &[Message::user("z")])
            .await
            .unwrap();
        store
            .append(&ThreadId::from("alpha"), &[Message::user("a")])
            .await
            .unwrap();

        let ids = store.list_thread_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), "alpha");
        assert_eq!(ids[1].as_str(), "zeta");
    }

    #[tokio::test]
    async fn empty_append_is_noop() {
        let store = InMemoryStore::new();
        store.append(&ThreadId::from("t"), &[]).await.unwrap();
        // No thread is created for an empty batch
        assert!(store.list_thread_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_distinct_threads() {
        let store = Arc::new(InMemoryStore::new());

        let mut handles = Vec::new();
        for t in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let thread = ThreadId::from(format!("thread-{t}").as_str());
                for i in 0..10 {
                    store
                        .append(&thread, &[Message::user(format!("msg {i}"))])
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for t in 0..8 {
            let messages = store
                .load(&ThreadId::from(format!("thread-{t}").as_str()))
                .await
                .unwrap();
            assert_eq!(messages.len(), 10);
            // Per-thread order is preserved
            for (i, m) in messages.iter().enumerate() {
                assert_eq!(m.content, format!("msg {i}"));
            }
        }
    }
}
