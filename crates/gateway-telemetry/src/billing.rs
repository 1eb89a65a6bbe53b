//! The billing-update queue's payload (spec.md §4.6 "Billing flush").

use time::OffsetDateTime;

/// One `AddUsage` call deferred onto the billing queue so a slow or
/// temporarily-unavailable counter store never blocks the response path.
#[derive(Debug, Clone)]
pub struct BillingUpdate {
    pub api_key_id: i64,
    pub delta_usd_micros: i64,
    pub recorded_at: OffsetDateTime,
}
