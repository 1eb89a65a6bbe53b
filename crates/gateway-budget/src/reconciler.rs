use std::sync::Arc;
use std::time::Duration;

use gateway_common::current_year_month;
use gateway_counters::CounterStore;
use gateway_store::{MonthlyUsageSummaryUpsert, Storage};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Periodically projects the live monthly accumulators into
/// `monthly_usage_summary` rows (spec.md §4.4). Advisory only: enforcement
/// never reads this table.
pub struct BudgetReconciler {
    counters: CounterStore,
    storage: Arc<dyn Storage>,
    interval: Duration,
}

impl BudgetReconciler {
    pub fn new(counters: CounterStore, storage: Arc<dyn Storage>, interval: Duration) -> Self {
        Self { counters, storage, interval }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once(OffsetDateTime::now_utc()).await {
                    error!(event = "budget_reconcile_failed", error = %err);
                }
            }
        })
    }

    /// One reconciliation pass: reads every enabled key's current-month
    /// accumulator and request counter and upserts the summary row,
    /// idempotently keyed on (api_key_id, year, month) (spec.md §8
    /// "Monthly reconciliation is idempotent").
    pub async fn run_once(&self, now: OffsetDateTime) -> Result<(), gateway_store::StorageError> {
        let year_month = current_year_month(now);
        let suffix = year_month.counter_suffix();
        let key_ids = self.storage.list_enabled_api_key_ids().await?;

        let mut reconciled = 0usize;
        for api_key_id in key_ids {
            let total_cost_usd_micros = self
                .counters
                .budget_get_micros(&api_key_id.to_string(), &suffix)
                .await
                .unwrap_or(0);
            let total_requests = self
                .counters
                .budget_request_count(&api_key_id.to_string(), &suffix)
                .await
                .unwrap_or(0);

            self.storage
                .upsert_monthly_summary(MonthlyUsageSummaryUpsert {
                    api_key_id,
                    year: year_month.year,
                    month: year_month.month as i32,
                    total_cost_usd_micros,
                    total_requests,
                })
                .await?;
            reconciled += 1;
        }

        info!(event = "budget_reconciled", keys = reconciled, year_month = %year_month);
        Ok(())
    }
}
