//! The two queue shapes from spec.md §4.6: the log queue trims its oldest
//! entry on overflow, the billing queue fails the enqueue fast instead.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, mpsc};

use crate::billing::BillingUpdate;
use crate::record::LogRecord;

/// Bounded ring buffer: `enqueue` never blocks and never fails; past
/// capacity the oldest record is dropped to make room for the newest.
pub struct LogQueue {
    buffer: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    notify: Notify,
    stopped: AtomicBool,
}

impl LogQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn enqueue(&self, record: LogRecord) {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
        drop(buffer);
        self.notify.notify_one();
    }

    pub fn drain_batch(&self, max: usize) -> Vec<LogRecord> {
        let mut buffer = self.buffer.lock().unwrap();
        let take = max.min(buffer.len());
        buffer.drain(..take).collect()
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Signals the drain worker to exit once the buffer is empty (spec.md
    /// §4.6 "Graceful shutdown closes the queue's stop signal").
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thin wrapper over a bounded `mpsc` channel: `try_enqueue` fails fast when
/// the channel is full rather than trimming, matching the billing queue's
/// at-capacity behavior in spec.md §4.6.
pub struct BillingQueue {
    tx: mpsc::Sender<BillingUpdate>,
}

#[derive(Debug, thiserror::Error)]
#[error("billing queue is at capacity")]
pub struct BillingQueueFull;

impl BillingQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BillingUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn try_enqueue(&self, update: BillingUpdate) -> Result<(), BillingQueueFull> {
        self.tx.try_send(update).map_err(|_| BillingQueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn record(id: &str) -> LogRecord {
        LogRecord {
            timestamp: OffsetDateTime::UNIX_EPOCH,
            request_id: id.to_string(),
            api_key_id: 1,
            api_key_name: "k".into(),
            provider: "openai-main".into(),
            model: "gpt-4o".into(),
            alias: None,
            tags: serde_json::json!({}),
            provider_ms: 0,
            gateway_ms: 0,
            cost_usd: 0.0,
            error: None,
            request_payload: None,
            response_payload: None,
        }
    }

    #[test]
    fn overflow_drops_the_oldest_entry() {
        let queue = LogQueue::new(2);
        queue.enqueue(record("a"));
        queue.enqueue(record("b"));
        queue.enqueue(record("c"));

        let batch = queue.drain_batch(10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].request_id, "b");
        assert_eq!(batch[1].request_id, "c");
    }

    #[tokio::test]
    async fn billing_queue_fails_fast_when_full() {
        let (queue, mut rx) = BillingQueue::channel(1);
        let now = OffsetDateTime::UNIX_EPOCH;
        queue.try_enqueue(BillingUpdate { api_key_id: 1, delta_usd_micros: 10, recorded_at: now }).unwrap();
        let err = queue
            .try_enqueue(BillingUpdate { api_key_id: 1, delta_usd_micros: 10, recorded_at: now })
            .unwrap_err();
        assert_eq!(err.to_string(), "billing queue is at capacity");

        rx.recv().await.unwrap();
    }
}
