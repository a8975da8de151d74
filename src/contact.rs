//! Contact tracking
//!
//! Computed once when a record is created: how many times this counterpart
//! has been contacted before, how many of those were today (the lead's local
//! day), and whether any prior contact was answered. The counts read
//! committed records only and are never recomputed when later calls arrive.
//!
//! The query deliberately runs without the new record's lock; under heavy
//! concurrent load for the same counterpart the counts may be slightly
//! stale, which is accepted.

use chrono::{DateTime, Utc};

use crate::geo;
use crate::record::{CallRecord, ContactPeriod, Disposition};
use crate::store::CallStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactSummary {
    pub contact_number: u32,
    pub contact_number_today: u32,
    pub previously_answered: bool,
    pub contact_period: ContactPeriod,
}

/// Summarize prior contact with a counterpart, for a record being created.
///
/// `exclude_identifier` keeps the record under construction out of its own
/// count on replayed creation events. Platform caller IDs are not leads and
/// contribute nothing.
pub async fn summarize(
    store: &CallStore,
    counterpart_number: &str,
    platform_numbers: &[String],
    region: Option<&str>,
    started_at: DateTime<Utc>,
    exclude_identifier: &str,
) -> ContactSummary {
    let local_start = geo::local_time(started_at, region);
    let contact_period = ContactPeriod::from_local_hour(chrono::Timelike::hour(&local_start));

    let normalized = geo::normalize_number(counterpart_number);
    let is_platform = platform_numbers
        .iter()
        .any(|n| geo::normalize_number(n) == normalized);
    if normalized.is_empty() || is_platform {
        return ContactSummary {
            contact_number: 1,
            contact_number_today: 1,
            previously_answered: false,
            contact_period,
        };
    }

    let today = local_start.date_naive();
    let mut prior = 0u32;
    let mut prior_today = 0u32;
    let mut previously_answered = false;

    for rec in store.snapshot().await {
        if rec.identifier == exclude_identifier {
            continue;
        }
        if !is_prior_contact(&rec, &normalized) {
            continue;
        }
        prior += 1;
        if rec.disposition == Disposition::Answered {
            previously_answered = true;
        }
        let same_day = rec
            .started_at
            .map(|ts| geo::local_time(ts, region).date_naive() == today)
            .unwrap_or(false);
        if same_day {
            prior_today += 1;
        }
    }

    ContactSummary {
        contact_number: prior + 1,
        contact_number_today: prior_today + 1,
        previously_answered,
        contact_period,
    }
}

fn is_prior_contact(rec: &CallRecord, normalized_counterpart: &str) -> bool {
    geo::normalize_number(&rec.counterpart_number) == normalized_counterpart
}
