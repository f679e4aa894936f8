//! Period math and timestamp normalization.
//!
//! All timestamps in the quota domain are UTC. Billing providers deliver
//! timestamps as either epoch numbers or ISO-8601 strings; both are
//! normalized here, and unparseable values collapse to absent.

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::BillingCycle;

/// Epoch values at or above this magnitude are interpreted as milliseconds;
/// below it, as seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// A timestamp as it arrives on the wire: epoch number or ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    /// Epoch seconds or milliseconds.
    Epoch(f64),
    /// ISO-8601 / RFC 3339 text.
    Text(String),
}

/// Normalize a wire timestamp to UTC.
///
/// Epoch numbers are interpreted as milliseconds when their magnitude is at
/// least 10^12, seconds otherwise. Strings must parse as RFC 3339.
/// Unparseable values return `None`.
#[must_use]
pub fn normalize_timestamp(input: &TimestampInput) -> Option<DateTime<Utc>> {
    match input {
        TimestampInput::Epoch(n) => {
            if !n.is_finite() {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let millis = if n.abs() >= EPOCH_MILLIS_THRESHOLD {
                *n as i64
            } else {
                (n * 1000.0) as i64
            };
            DateTime::from_timestamp_millis(millis)
        }
        TimestampInput::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Compute the synthetic billing period for a plan-sync at `now`.
///
/// Monthly periods end on the first day of the next UTC month at midnight;
/// yearly periods end on the same month/day one UTC year ahead (clamped for
/// short months).
#[must_use]
pub fn synthetic_period(now: DateTime<Utc>, cycle: BillingCycle) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = match cycle {
        BillingCycle::Monthly => first_of_next_month(now),
        BillingCycle::Yearly => now
            .checked_add_months(Months::new(12))
            // INVARIANT: adding 12 months to any representable billing
            // timestamp stays within chrono's supported range.
            .expect("period end within supported range"),
    };
    (now, end)
}

/// Midnight UTC on the first day of the month after `now`.
#[must_use]
pub fn first_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        // INVARIANT: day 1 of any month at midnight is a valid UTC datetime.
        .expect("first of month is a valid UTC datetime")
}
