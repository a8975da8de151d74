//! End-to-end reconciliation scenarios
//!
//! Each test drives a full engine (null provider, null alert sink) with the
//! event sequences the provider actually produces: duplicated deliveries,
//! out-of-order arrivals, contradictory verdicts, and placeholder
//! identifiers that learn their real name late.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::agents::{AgentDirectory, RegisterAgentRequest};
use crate::alerts::{AlertSink, NullAlertSink};
use crate::error::Error;
use crate::event::{AmdVerdict, CallEvent, EventKind, LegStatus, ProgressStatus};
use crate::provider::{NullProvider, ProviderClient};
use crate::reconcile::{Applied, ReconcilePolicy, Reconciler};
use crate::record::{CallRecord, Direction, Disposition};
use crate::store::CallStore;

const PLATFORM: &str = "+12125550199";
const CALLER: &str = "+14155550100";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap()
}

fn build_engine() -> (Reconciler, Arc<CallStore>, Arc<AgentDirectory>) {
    let store = Arc::new(CallStore::new(5, 1));
    let agents = Arc::new(AgentDirectory::new());
    let provider: Arc<dyn ProviderClient> = Arc::new(NullProvider);
    let alerts: Arc<dyn AlertSink> = Arc::new(NullAlertSink);
    let engine = Reconciler::new(
        store.clone(),
        agents.clone(),
        provider,
        alerts,
        ReconcilePolicy::default(),
        vec![PLATFORM.to_string()],
        String::new(),
    );
    (engine, store, agents)
}

fn ev(identifier: &str, kind: EventKind, direction: Direction, offset_secs: i64) -> CallEvent {
    CallEvent {
        identifier: identifier.to_string(),
        secondary_identifier: None,
        kind,
        direction: Some(direction),
        counterpart_number: Some(CALLER.to_string()),
        platform_number: Some(PLATFORM.to_string()),
        timestamp: t0() + Duration::seconds(offset_secs),
        parent_identifier: None,
    }
}

fn progress(
    identifier: &str,
    status: ProgressStatus,
    direction: Direction,
    offset_secs: i64,
) -> CallEvent {
    ev(
        identifier,
        EventKind::Progress {
            status,
            provider_duration: None,
        },
        direction,
        offset_secs,
    )
}

fn completed(
    identifier: &str,
    direction: Direction,
    offset_secs: i64,
    provider_duration: i64,
) -> CallEvent {
    ev(
        identifier,
        EventKind::Progress {
            status: ProgressStatus::Completed,
            provider_duration: Some(provider_duration),
        },
        direction,
        offset_secs,
    )
}

async fn fetch(store: &CallStore, identifier: &str) -> CallRecord {
    store.lock(identifier).await.unwrap().clone()
}

#[tokio::test]
async fn inbound_call_nobody_answers_is_no_answer() {
    let (engine, store, _) = build_engine();

    let applied = engine
        .apply(progress("CA100", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    assert_eq!(applied, Applied::Created);

    engine
        .apply(completed("CA100", Direction::Inbound, 45, 45))
        .await
        .unwrap();

    let rec = fetch(&store, "CA100").await;
    assert_eq!(rec.disposition, Disposition::NoAnswer);
    assert_eq!(rec.duration, 45);
    assert!(rec.agent_identifier.is_none());
    assert!(rec.answered_at.is_none());
}

#[tokio::test]
async fn amd_machine_verdict_survives_later_completed_event() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA200", ProgressStatus::Initiated, Direction::Outbound, 0))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA200",
            EventKind::AmdResult {
                verdict: AmdVerdict::Machine,
            },
            Direction::Outbound,
            8,
        ))
        .await
        .unwrap();
    engine
        .apply(completed("CA200", Direction::Outbound, 40, 40))
        .await
        .unwrap();

    let rec = fetch(&store, "CA200").await;
    assert_eq!(rec.disposition, Disposition::Voicemail);
    assert!(rec.ended_at.is_some());
}

#[tokio::test]
async fn short_outbound_answer_without_human_is_voicemail() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA300", ProgressStatus::Initiated, Direction::Outbound, 0))
        .await
        .unwrap();
    engine
        .apply(progress("CA300", ProgressStatus::InProgress, Direction::Outbound, 5))
        .await
        .unwrap();
    engine
        .apply(completed("CA300", Direction::Outbound, 9, 4))
        .await
        .unwrap();

    let rec = fetch(&store, "CA300").await;
    assert_eq!(rec.disposition, Disposition::Voicemail);
    assert_eq!(rec.duration, 4);
}

#[tokio::test]
async fn confirmed_human_defeats_short_call_heuristic() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA310", ProgressStatus::Initiated, Direction::Outbound, 0))
        .await
        .unwrap();
    engine
        .apply(progress("CA310", ProgressStatus::InProgress, Direction::Outbound, 5))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA310",
            EventKind::AmdResult {
                verdict: AmdVerdict::Human,
            },
            Direction::Outbound,
            6,
        ))
        .await
        .unwrap();
    engine
        .apply(completed("CA310", Direction::Outbound, 9, 4))
        .await
        .unwrap();

    let rec = fetch(&store, "CA310").await;
    assert_eq!(rec.disposition, Disposition::Answered);
}

#[tokio::test]
async fn placeholder_identifier_promoted_without_duplicate_record() {
    let (engine, store, _) = build_engine();

    // Routing knows about the task before the provider assigns a call id.
    engine
        .apply(ev(
            "TASK:WT77",
            EventKind::TaskCreated,
            Direction::Outbound,
            0,
        ))
        .await
        .unwrap();

    let mut update = ev(
        "CA999",
        EventKind::TaskUpdated {
            call_identifier: Some("CA999".to_string()),
        },
        Direction::Outbound,
        3,
    );
    update.secondary_identifier = Some("TASK:WT77".to_string());
    engine.apply(update).await.unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.canonical("TASK:WT77"), "CA999");

    // Progress for the real identifier lands on the promoted record.
    engine
        .apply(completed("CA999", Direction::Outbound, 30, 30))
        .await
        .unwrap();

    let rec = fetch(&store, "TASK:WT77").await;
    assert_eq!(rec.identifier, "CA999");
    assert!(rec.disposition.is_terminal());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn duplicate_terminal_delivery_is_a_no_op() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA400", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(completed("CA400", Direction::Inbound, 30, 30))
        .await
        .unwrap();
    let first = fetch(&store, "CA400").await;

    let applied = engine
        .apply(completed("CA400", Direction::Inbound, 95, 95))
        .await
        .unwrap();
    assert_eq!(applied, Applied::NoOp);

    let second = fetch(&store, "CA400").await;
    assert_eq!(second.disposition, first.disposition);
    assert_eq!(second.duration, first.duration);
    assert_eq!(second.ended_at, first.ended_at);
}

#[tokio::test]
async fn late_in_progress_after_terminal_is_ignored() {
    let (engine, store, _) = build_engine();

    engine
        .apply(completed("CA410", Direction::Inbound, 20, 20))
        .await
        .unwrap();
    engine
        .apply(progress("CA410", ProgressStatus::InProgress, Direction::Inbound, 5))
        .await
        .unwrap();

    let rec = fetch(&store, "CA410").await;
    assert_eq!(rec.disposition, Disposition::NoAnswer);
    assert!(rec.answered_at.is_none());
}

#[tokio::test]
async fn events_for_unknown_calls_are_dropped() {
    let (engine, store, _) = build_engine();

    let result = engine
        .apply(ev(
            "CA-unseen",
            EventKind::AmdResult {
                verdict: AmdVerdict::Machine,
            },
            Direction::Outbound,
            0,
        ))
        .await;
    assert!(matches!(result, Err(Error::UnknownIdentifier(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn dial_connected_leg_resolves_agent() {
    let (engine, store, agents) = build_engine();
    agents.register(RegisterAgentRequest {
        identifier: "WK42".to_string(),
        display_name: "Dana".to_string(),
        address: "+13105550177".to_string(),
    });

    engine
        .apply(progress("CA500", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    let mut outcome = ev(
        "CA500",
        EventKind::DialOutcome {
            status: LegStatus::Completed,
            leg_identifier: Some("CA501".to_string()),
            called_address: Some("+13105550177".to_string()),
        },
        Direction::Inbound,
        12,
    );
    outcome.direction = None;
    engine.apply(outcome).await.unwrap();

    let rec = fetch(&store, "CA500").await;
    assert_eq!(rec.disposition, Disposition::Answered);
    assert_eq!(rec.agent_identifier.as_deref(), Some("WK42"));
    assert_eq!(rec.agent_display_name.as_deref(), Some("Dana"));
    assert!(rec.answered_at.is_some());
}

#[tokio::test]
async fn dial_connected_to_nobody_is_not_answered() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA510", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA510",
            EventKind::DialOutcome {
                status: LegStatus::Completed,
                leg_identifier: None,
                called_address: Some("+19995550000".to_string()),
            },
            Direction::Inbound,
            12,
        ))
        .await
        .unwrap();

    let rec = fetch(&store, "CA510").await;
    assert_eq!(rec.disposition, Disposition::NoAnswer);
    assert!(rec.agent_identifier.is_none());
}

#[tokio::test]
async fn recording_after_missed_dial_upgrades_to_voicemail() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA600", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA600",
            EventKind::DialOutcome {
                status: LegStatus::NoAnswer,
                leg_identifier: None,
                called_address: None,
            },
            Direction::Inbound,
            20,
        ))
        .await
        .unwrap();
    assert_eq!(fetch(&store, "CA600").await.disposition, Disposition::NoAnswer);

    engine
        .apply(ev(
            "CA600",
            EventKind::RecordingReady {
                reference: "https://media.example/RE600".to_string(),
            },
            Direction::Inbound,
            80,
        ))
        .await
        .unwrap();

    let rec = fetch(&store, "CA600").await;
    assert_eq!(rec.disposition, Disposition::Voicemail);
    assert_eq!(
        rec.recording_reference.as_deref(),
        Some("https://media.example/RE600")
    );
}

#[tokio::test]
async fn repeat_caller_contact_counters_accumulate() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA700", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(progress("CA700", ProgressStatus::InProgress, Direction::Inbound, 4))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA700",
            EventKind::ReservationAccepted {
                agent_identifier: Some("WK1".to_string()),
                agent_display_name: None,
            },
            Direction::Inbound,
            4,
        ))
        .await
        .unwrap();
    engine
        .apply(completed("CA700", Direction::Inbound, 60, 56))
        .await
        .unwrap();

    // Same caller, one hour later.
    engine
        .apply(progress("CA701", ProgressStatus::Ringing, Direction::Inbound, 3600))
        .await
        .unwrap();

    let rec = fetch(&store, "CA701").await;
    assert_eq!(rec.contact_number, 2);
    assert_eq!(rec.contact_number_today, 2);
    assert!(rec.previously_answered);
}

#[tokio::test]
async fn originated_calls_run_contact_tracking() {
    let (engine, store, _) = build_engine();

    // The lead was already reached once before the API places a new call.
    engine
        .apply(progress("CA900", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(completed("CA900", Direction::Inbound, 30, 30))
        .await
        .unwrap();

    engine
        .seed_outbound_call("CA901", CALLER, PLATFORM)
        .await
        .unwrap();

    let rec = fetch(&store, "CA901").await;
    assert_eq!(rec.direction, Direction::Outbound);
    assert_eq!(rec.contact_number, 2);
    // The prior contact was on another day.
    assert_eq!(rec.contact_number_today, 1);
    assert!(rec.contact_period.is_some());
    assert_eq!(rec.region_code.as_deref(), Some("CA"));
}

#[tokio::test]
async fn reservation_accept_records_agent_and_queue_time() {
    let (engine, store, _) = build_engine();

    engine
        .apply(progress("CA800", ProgressStatus::Ringing, Direction::Inbound, 0))
        .await
        .unwrap();
    engine
        .apply(ev(
            "CA800",
            EventKind::ReservationAccepted {
                agent_identifier: Some("WK9".to_string()),
                agent_display_name: Some("Robin".to_string()),
            },
            Direction::Inbound,
            18,
        ))
        .await
        .unwrap();
    engine
        .apply(completed("CA800", Direction::Inbound, 140, 122))
        .await
        .unwrap();

    let rec = fetch(&store, "CA800").await;
    assert_eq!(rec.disposition, Disposition::Answered);
    assert_eq!(rec.queue_time, 18);
    assert_eq!(rec.duration, 122);
    assert_eq!(rec.agent_display_name.as_deref(), Some("Robin"));
}
