//! Asynchronous telemetry pipeline (spec.md §4.6): bounded log and
//! billing-update queues, batched flush with retry and a dead-letter
//! fallback.

pub mod billing;
pub mod bus;
pub mod dlq;
pub mod flush;
pub mod queue;
pub mod record;
pub mod retry;

pub use billing::BillingUpdate;
pub use bus::TelemetryBus;
pub use dlq::{DeadLetterQueue, DlqItem};
pub use queue::BillingQueueFull;
pub use record::LogRecord;
