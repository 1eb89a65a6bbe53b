//! In-memory dead-letter store (spec.md §4.6, §9 "Dead-letter queue").
//!
//! Kept local to the process rather than in the counter store: the items
//! landing here are already on the degraded path (every retry failed), so a
//! second store round-trip buys nothing and the operator tooling only needs
//! read/list/requeue within one process's lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DlqItem<T> {
    pub id: Uuid,
    pub item: T,
    pub error: String,
    pub failed_at: OffsetDateTime,
    pub retry_count: u32,
}

/// Single-writer with respect to itself: `take` removes atomically so a
/// concurrent operator retry and a new arrival never observe each other's
/// half-applied state.
pub struct DeadLetterQueue<T> {
    items: Mutex<HashMap<Uuid, DlqItem<T>>>,
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self { items: Mutex::new(HashMap::new()) }
    }
}

impl<T: Clone> DeadLetterQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: T, error: String, retry_count: u32) -> Uuid {
        let id = Uuid::new_v4();
        let entry = DlqItem { id, item, error, failed_at: OffsetDateTime::now_utc(), retry_count };
        self.items.lock().unwrap().insert(id, entry);
        id
    }

    pub fn list(&self) -> Vec<DlqItem<T>> {
        self.items.lock().unwrap().values().cloned().collect()
    }

    /// Removes and returns the item so the caller can re-enqueue it onto the
    /// live queue; removal and retrieval happen under one lock acquisition.
    pub fn take(&self, id: Uuid) -> Option<DlqItem<T>> {
        self.items.lock().unwrap().remove(&id)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.items.lock().unwrap().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_the_item_for_requeue() {
        let dlq: DeadLetterQueue<&str> = DeadLetterQueue::new();
        let id = dlq.insert("payload", "upstream unreachable".into(), 3);
        assert_eq!(dlq.len(), 1);

        let taken = dlq.take(id).unwrap();
        assert_eq!(taken.item, "payload");
        assert_eq!(taken.retry_count, 3);
        assert!(dlq.is_empty());
    }

    #[test]
    fn list_reflects_every_pending_item() {
        let dlq: DeadLetterQueue<i32> = DeadLetterQueue::new();
        dlq.insert(1, "err-a".into(), 1);
        dlq.insert(2, "err-b".into(), 2);
        assert_eq!(dlq.list().len(), 2);
    }
}
