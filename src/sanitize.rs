//! Disposition sanitizer
//!
//! Post-hoc consistency pass run after every terminal transition. Webhook
//! sources can land in orders that leave a record contradicting itself
//! (an "answered" inbound call with no agent, a terminal call with no
//! disposition); this pass repairs the shapes it knows and reports the
//! ones it does not, without ever guessing.

use tracing::{error, info};

use crate::metrics;
use crate::record::{CallRecord, Direction, Disposition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeOutcome {
    /// Nothing to repair.
    Clean,
    /// A contradiction was detected and rewritten.
    Repaired {
        before: Disposition,
        after: Disposition,
    },
    /// A shape outside the repair rules; left untouched for manual review.
    Unrepairable { reason: &'static str },
}

/// Repair a single record in place. Idempotent: a second run over the same
/// record always returns [`SanitizeOutcome::Clean`].
pub fn sanitize(rec: &mut CallRecord) -> SanitizeOutcome {
    // Timestamp order violations have no safe repair.
    if let (Some(started), Some(ended)) = (rec.started_at, rec.ended_at) {
        if started > ended {
            return SanitizeOutcome::Unrepairable {
                reason: "started_at after ended_at",
            };
        }
    }

    // An inbound call cannot be answered by nobody. If a recording was
    // captured the caller reached voicemail, otherwise nobody picked up.
    if rec.direction == Direction::Inbound
        && rec.disposition == Disposition::Answered
        && !rec.has_agent()
    {
        let before = rec.disposition;
        let after = if rec.recording_reference.is_some() {
            Disposition::Voicemail
        } else {
            Disposition::NoAnswer
        };
        rec.disposition = after;
        rec.answered_at = None;
        rec.queue_time = 0;
        rec.duration = metrics::call_duration(rec);
        return SanitizeOutcome::Repaired { before, after };
    }

    // A call that ended must have some disposition.
    if rec.disposition == Disposition::None && rec.ended_at.is_some() {
        let before = rec.disposition;
        let after = if rec.duration > 0 && rec.direction == Direction::Outbound {
            Disposition::Answered
        } else {
            Disposition::NoAnswer
        };
        rec.disposition = after;
        return SanitizeOutcome::Repaired { before, after };
    }

    SanitizeOutcome::Clean
}

/// Run the sanitizer and write the audit trail.
pub fn sanitize_and_log(rec: &mut CallRecord) -> SanitizeOutcome {
    let outcome = sanitize(rec);
    match &outcome {
        SanitizeOutcome::Clean => {}
        SanitizeOutcome::Repaired { before, after } => {
            info!(
                identifier = %rec.identifier,
                before = before.as_str(),
                after = after.as_str(),
                "sanitizer repaired contradictory disposition"
            );
        }
        SanitizeOutcome::Unrepairable { reason } => {
            error!(
                identifier = %rec.identifier,
                reason,
                "invariant violation outside sanitizer repair rules; record left as-is"
            );
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn inbound_answered(with_agent: bool, with_recording: bool) -> CallRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        let mut rec = CallRecord::new(
            "CA1",
            Direction::Inbound,
            "+14155550100",
            "+12125550199",
            t0,
        );
        rec.disposition = Disposition::Answered;
        rec.answered_at = Some(t0 + Duration::seconds(10));
        rec.ended_at = Some(t0 + Duration::seconds(70));
        rec.duration = 60;
        if with_agent {
            rec.agent_identifier = Some("WK1".into());
        }
        if with_recording {
            rec.recording_reference = Some("https://media.example/RE1".into());
        }
        rec
    }

    #[test]
    fn inbound_answered_without_agent_becomes_voicemail_with_recording() {
        let mut rec = inbound_answered(false, true);
        let outcome = sanitize(&mut rec);
        assert_eq!(
            outcome,
            SanitizeOutcome::Repaired {
                before: Disposition::Answered,
                after: Disposition::Voicemail,
            }
        );
        assert!(rec.answered_at.is_none());
        // Duration falls back to elapsed time once answered_at is gone.
        assert_eq!(rec.duration, 70);
    }

    #[test]
    fn inbound_answered_without_agent_or_recording_becomes_no_answer() {
        let mut rec = inbound_answered(false, false);
        let outcome = sanitize(&mut rec);
        assert_eq!(
            outcome,
            SanitizeOutcome::Repaired {
                before: Disposition::Answered,
                after: Disposition::NoAnswer,
            }
        );
    }

    #[test]
    fn answered_with_agent_is_left_alone() {
        let mut rec = inbound_answered(true, false);
        assert_eq!(sanitize(&mut rec), SanitizeOutcome::Clean);
        assert_eq!(rec.disposition, Disposition::Answered);
        assert!(rec.answered_at.is_some());
    }

    #[test]
    fn empty_disposition_after_terminal_event_is_backfilled() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        let mut rec = CallRecord::new(
            "CA2",
            Direction::Outbound,
            "+14155550100",
            "+12125550199",
            t0,
        );
        rec.ended_at = Some(t0 + Duration::seconds(30));
        rec.duration = 30;
        assert_eq!(
            sanitize(&mut rec),
            SanitizeOutcome::Repaired {
                before: Disposition::None,
                after: Disposition::Answered,
            }
        );

        let mut rec = CallRecord::new(
            "CA3",
            Direction::Inbound,
            "+14155550100",
            "+12125550199",
            t0,
        );
        rec.ended_at = Some(t0 + Duration::seconds(30));
        rec.duration = 30;
        assert_eq!(
            sanitize(&mut rec),
            SanitizeOutcome::Repaired {
                before: Disposition::None,
                after: Disposition::NoAnswer,
            }
        );
    }

    #[test]
    fn sanitizer_is_idempotent() {
        let mut rec = inbound_answered(false, true);
        sanitize(&mut rec);
        let second = sanitize(&mut rec);
        assert_eq!(second, SanitizeOutcome::Clean);
        assert_eq!(rec.disposition, Disposition::Voicemail);
    }

    #[test]
    fn inverted_timestamps_are_reported_not_guessed() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        let mut rec = CallRecord::new(
            "CA4",
            Direction::Outbound,
            "+14155550100",
            "+12125550199",
            t0,
        );
        rec.started_at = Some(t0 + Duration::seconds(100));
        rec.ended_at = Some(t0);
        rec.disposition = Disposition::Answered;
        let before = rec.clone();

        let outcome = sanitize(&mut rec);
        assert!(matches!(outcome, SanitizeOutcome::Unrepairable { .. }));
        assert_eq!(rec.disposition, before.disposition);
        assert_eq!(rec.answered_at, before.answered_at);
    }
}
