//! Wires the two queues to their sinks: object-storage flush for the log
//! queue, the budget accountant for the billing queue. Shaped after the
//! teacher's `StorageBus::spawn`/`downstream_writer` pair — one dedicated
//! worker task per queue, draining in (size, timeout) batches.

use std::sync::Arc;
use std::time::Duration;

use gateway_budget::BudgetAccountant;
use gateway_common::TelemetryConfig;
use object_store::ObjectStore;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self as tokio_time, MissedTickBehavior};
use tracing::{error, warn};

use crate::billing::BillingUpdate;
use crate::dlq::DeadLetterQueue;
use crate::flush::write_log_batch;
use crate::queue::{BillingQueue, BillingQueueFull, LogQueue};
use crate::record::LogRecord;
use crate::retry::retry_with_backoff;

/// Handle kept alive for the lifetime of the process.
pub struct TelemetryBus {
    log_queue: Arc<LogQueue>,
    billing_queue: BillingQueue,
    log_dlq: Arc<DeadLetterQueue<Vec<LogRecord>>>,
    billing_dlq: Arc<DeadLetterQueue<BillingUpdate>>,
    shutdown_drain_deadline: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl TelemetryBus {
    pub fn spawn(config: TelemetryConfig, object_store: Arc<dyn ObjectStore>, accountant: BudgetAccountant) -> Self {
        let log_queue = Arc::new(LogQueue::new(config.log_queue_capacity));
        let log_dlq = Arc::new(DeadLetterQueue::new());
        let (billing_queue, billing_rx) = BillingQueue::channel(config.billing_queue_capacity);
        let billing_dlq = Arc::new(DeadLetterQueue::new());

        let mut handles = Vec::new();
        handles.push(tokio::spawn(log_writer(
            log_queue.clone(),
            log_dlq.clone(),
            object_store,
            config.clone(),
        )));
        handles.push(tokio::spawn(billing_writer(billing_rx, billing_dlq.clone(), accountant, config.clone())));

        Self {
            log_queue,
            billing_queue,
            log_dlq,
            billing_dlq,
            shutdown_drain_deadline: config.shutdown_drain_deadline,
            handles,
        }
    }

    /// Never fails: at capacity the oldest buffered record is dropped
    /// (spec.md §4.6).
    pub fn enqueue_log(&self, record: LogRecord) {
        self.log_queue.enqueue(record);
    }

    /// Fails fast at capacity instead of trimming (spec.md §4.6).
    pub fn enqueue_billing(&self, update: BillingUpdate) -> Result<(), BillingQueueFull> {
        self.billing_queue.try_enqueue(update)
    }

    pub fn log_dlq(&self) -> &DeadLetterQueue<Vec<LogRecord>> {
        &self.log_dlq
    }

    pub fn billing_dlq(&self) -> &DeadLetterQueue<BillingUpdate> {
        &self.billing_dlq
    }

    pub fn queued_log_count(&self) -> usize {
        self.log_queue.len()
    }

    /// Closes both queues' stop signals, then waits for the drain workers to
    /// finish up to the configured deadline (spec.md §4.6 "Graceful
    /// shutdown").
    pub async fn shutdown(mut self) {
        self.log_queue.stop();
        drop(self.billing_queue);

        let handles = std::mem::take(&mut self.handles);
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio_time::timeout(self.shutdown_drain_deadline, drain).await.is_err() {
            warn!(event = "telemetry_shutdown_drain_timed_out");
        }
    }
}

async fn log_writer(
    queue: Arc<LogQueue>,
    dlq: Arc<DeadLetterQueue<Vec<LogRecord>>>,
    store: Arc<dyn ObjectStore>,
    config: TelemetryConfig,
) {
    let mut ticker = tokio_time::interval(config.batch_timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = queue.notified() => {}
            _ = ticker.tick() => {}
        }

        loop {
            let batch = queue.drain_batch(config.batch_size);
            if batch.is_empty() {
                break;
            }
            flush_log_batch(&store, &dlq, &config, batch).await;
        }

        if queue.is_stopped() && queue.is_empty() {
            break;
        }
    }
}

async fn flush_log_batch(
    store: &Arc<dyn ObjectStore>,
    dlq: &DeadLetterQueue<Vec<LogRecord>>,
    config: &TelemetryConfig,
    batch: Vec<LogRecord>,
) {
    let result = retry_with_backoff(config.max_retries, config.retry_base, || {
        write_log_batch(
            store.as_ref(),
            &config.log_key_prefix,
            &config.pod_id,
            &batch,
            config.gzip,
            OffsetDateTime::now_utc(),
        )
    })
    .await;

    if let Err(err) = result {
        warn!(event = "telemetry_log_flush_exhausted", error = %err, batch_size = batch.len());
        dlq.insert(batch, err.to_string(), config.max_retries);
    }
}

async fn billing_writer(
    mut rx: mpsc::Receiver<BillingUpdate>,
    dlq: Arc<DeadLetterQueue<BillingUpdate>>,
    accountant: BudgetAccountant,
    config: TelemetryConfig,
) {
    let mut buffer = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio_time::interval(config.batch_timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_update = rx.recv() => {
                match maybe_update {
                    Some(update) => {
                        buffer.push(update);
                        if buffer.len() >= config.batch_size {
                            flush_billing_batch(&accountant, &dlq, &config, &mut buffer).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            flush_billing_batch(&accountant, &dlq, &config, &mut buffer).await;
                        }
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_billing_batch(&accountant, &dlq, &config, &mut buffer).await;
                }
            }
        }
    }
}

async fn flush_billing_batch(
    accountant: &BudgetAccountant,
    dlq: &DeadLetterQueue<BillingUpdate>,
    config: &TelemetryConfig,
    buffer: &mut Vec<BillingUpdate>,
) {
    let mut batch = Vec::new();
    std::mem::swap(buffer, &mut batch);

    for update in batch {
        let result = retry_with_backoff(config.max_retries, config.retry_base, || {
            accountant.add_usage(update.api_key_id, update.delta_usd_micros, update.recorded_at)
        })
        .await;

        if let Err(err) = result {
            error!(event = "telemetry_billing_flush_exhausted", error = %err, api_key_id = update.api_key_id);
            dlq.insert(update, err.to_string(), config.max_retries);
        }
    }
}
