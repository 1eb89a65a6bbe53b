use gateway_common::current_year_month;
use gateway_counters::CounterStore;
use time::OffsetDateTime;
use tracing::warn;

/// 60-day retention on the monthly cost accumulator (spec.md §4.4).
const ACCUMULATOR_TTL_SECONDS: i64 = 60 * 24 * 60 * 60;

/// Running monthly cost per key, gating calls against `MonthlyBudgetUSD`
/// (spec.md §4.4). Enforcement reads the live counter-store accumulator;
/// `gateway-store::monthly_usage_summary` is an advisory projection the
/// background reconciler keeps in sync for reporting and cold-start
/// recovery, never consulted on the hot path.
#[derive(Clone)]
pub struct BudgetAccountant {
    counters: CounterStore,
}

impl BudgetAccountant {
    pub fn new(counters: CounterStore) -> Self {
        Self { counters }
    }

    /// Returns `true` iff no budget is configured or the month's accumulator
    /// is still under it. Fails open on any counter-store error -- a
    /// degraded counter store must not turn into a blanket 402 (spec.md §4.4
    /// "On any store failure, fails open... but surfaces a telemetry
    /// warning"); the caller is responsible for emitting that warning to the
    /// telemetry pipeline.
    pub async fn within_budget(
        &self,
        api_key_id: i64,
        monthly_budget_usd_micros: Option<i64>,
        now: OffsetDateTime,
    ) -> bool {
        let Some(budget) = monthly_budget_usd_micros else {
            return true;
        };

        let suffix = current_year_month(now).counter_suffix();
        match self
            .counters
            .budget_get_micros(&api_key_id.to_string(), &suffix)
            .await
        {
            Ok(accumulated) => accumulated < budget,
            Err(err) => {
                warn!(event = "budget_check_failed_open", error = %err, api_key_id);
                true
            }
        }
    }

    /// Atomically increments the month's accumulator and request counter
    /// (spec.md §4.4 "AddUsage"). At-least-once: callers treat a failure
    /// here as best-effort and route it to the telemetry DLQ rather than
    /// failing the already-completed upstream call.
    pub async fn add_usage(
        &self,
        api_key_id: i64,
        delta_usd_micros: i64,
        now: OffsetDateTime,
    ) -> Result<(i64, i64), gateway_counters::CounterError> {
        let suffix = current_year_month(now).counter_suffix();
        self.counters
            .budget_incr_micros(&api_key_id.to_string(), &suffix, delta_usd_micros, ACCUMULATOR_TTL_SECONDS)
            .await
    }
}

#[cfg(test)]
mod tests {
    // `within_budget`/`add_usage` need a live counter store; exercised in
    // `tests/budget_boundary.rs` (`#[ignore]`d, gated on
    // `COUNTER_STORE_TEST_URL`). The $9.99 + $0.02 boundary from spec.md §8
    // scenario 4 lives there since it is inseparable from the live script.
}
