//! Duration and queue-time calculators
//!
//! Pure functions over a record's timestamps. Results are floored at zero
//! to tolerate clock skew between independent event sources.

use crate::record::CallRecord;

/// Duration in seconds: talk time when the call was answered, total elapsed
/// otherwise. Zero while the call has not ended.
pub fn call_duration(rec: &CallRecord) -> i64 {
    let Some(ended) = rec.ended_at else {
        return 0;
    };
    let from = match rec.answered_at {
        Some(answered) => answered,
        None => match rec.started_at {
            Some(started) => started,
            None => return 0,
        },
    };
    (ended - from).num_seconds().max(0)
}

/// Combine the computed duration with a provider-reported figure.
/// Whichever is larger wins; the provider's number never shrinks what we
/// measured ourselves.
pub fn effective_duration(computed: i64, provider: Option<i64>) -> i64 {
    computed.max(provider.unwrap_or(0)).max(0)
}

/// Seconds the caller spent waiting between start and answer.
pub fn queue_time(rec: &CallRecord) -> i64 {
    match (rec.started_at, rec.answered_at) {
        (Some(started), Some(answered)) => (answered - started).num_seconds().max(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Direction;
    use chrono::{Duration, TimeZone, Utc};

    fn record_at(started_offset: i64, answered: Option<i64>, ended: Option<i64>) -> CallRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        let mut rec = CallRecord::new(
            "CA100",
            Direction::Outbound,
            "+14155550100",
            "+12125550199",
            t0 + Duration::seconds(started_offset),
        );
        rec.answered_at = answered.map(|s| t0 + Duration::seconds(s));
        rec.ended_at = ended.map(|s| t0 + Duration::seconds(s));
        rec
    }

    #[test]
    fn talk_time_when_answered() {
        let rec = record_at(0, Some(5), Some(9));
        assert_eq!(call_duration(&rec), 4);
    }

    #[test]
    fn elapsed_time_when_unanswered() {
        let rec = record_at(0, None, Some(45));
        assert_eq!(call_duration(&rec), 45);
    }

    #[test]
    fn zero_before_call_ends() {
        let rec = record_at(0, Some(5), None);
        assert_eq!(call_duration(&rec), 0);
    }

    #[test]
    fn never_negative_under_clock_skew() {
        // ended_at behind answered_at, as delivered by skewed sources
        let rec = record_at(0, Some(30), Some(10));
        assert_eq!(call_duration(&rec), 0);
        assert_eq!(effective_duration(call_duration(&rec), Some(-7)), 0);
    }

    #[test]
    fn provider_figure_is_a_floor_not_a_ceiling() {
        assert_eq!(effective_duration(40, Some(38)), 40);
        assert_eq!(effective_duration(10, Some(42)), 42);
        assert_eq!(effective_duration(0, None), 0);
    }

    #[test]
    fn queue_time_from_start_to_answer() {
        let rec = record_at(0, Some(12), None);
        assert_eq!(queue_time(&rec), 12);
        let rec = record_at(0, None, None);
        assert_eq!(queue_time(&rec), 0);
    }
}
