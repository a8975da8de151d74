//! Event normalization
//!
//! Each webhook source posts its own raw shape; this module extracts the
//! canonical [`CallEvent`] the reconciler consumes. The only hard
//! requirement on any payload is a call (or task) identifier: without one
//! the event is malformed and gets dropped by the caller.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::record::Direction;

/// Call progress callback: one per provider status change on a call leg.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallProgressPayload {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
    pub timestamp: Option<String>,
    pub parent_call_sid: Option<String>,
}

/// Task-routing lifecycle callback. Task attributes arrive as an embedded
/// JSON document carrying direction, endpoints and (eventually) the real
/// call identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEventPayload {
    pub task_sid: Option<String>,
    pub event_type: Option<String>,
    pub task_attributes: Option<String>,
    pub worker_sid: Option<String>,
    pub worker_name: Option<String>,
}

/// Answering-machine detection result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmdPayload {
    pub call_sid: Option<String>,
    pub answered_by: Option<String>,
    pub parent_call_sid: Option<String>,
}

/// Recording lifecycle callback; only `completed` attaches a reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingPayload {
    pub call_sid: Option<String>,
    pub recording_sid: Option<String>,
    pub recording_url: Option<String>,
    pub recording_status: Option<String>,
}

/// Dial action callback: outcome of one dialed leg of a fan-out.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DialOutcomePayload {
    pub call_sid: Option<String>,
    pub dial_call_status: Option<String>,
    pub dial_call_sid: Option<String>,
    pub called: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Canceled,
    Failed,
}

impl ProgressStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(ProgressStatus::Initiated),
            "ringing" => Some(ProgressStatus::Ringing),
            "in-progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            "busy" => Some(ProgressStatus::Busy),
            "no-answer" => Some(ProgressStatus::NoAnswer),
            "canceled" => Some(ProgressStatus::Canceled),
            "failed" => Some(ProgressStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmdVerdict {
    Human,
    Machine,
    Fax,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegStatus {
    Completed,
    NoAnswer,
    Busy,
    Failed,
    Canceled,
}

impl LegStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" | "answered" => Some(LegStatus::Completed),
            "no-answer" => Some(LegStatus::NoAnswer),
            "busy" => Some(LegStatus::Busy),
            "failed" => Some(LegStatus::Failed),
            "canceled" => Some(LegStatus::Canceled),
            _ => None,
        }
    }
}

/// What happened, with the per-kind fields the reconciler needs.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Progress {
        status: ProgressStatus,
        provider_duration: Option<i64>,
    },
    TaskCreated,
    TaskUpdated {
        call_identifier: Option<String>,
    },
    ReservationAccepted {
        agent_identifier: Option<String>,
        agent_display_name: Option<String>,
    },
    TaskCompleted,
    AmdResult {
        verdict: AmdVerdict,
    },
    RecordingReady {
        reference: String,
    },
    DialOutcome {
        status: LegStatus,
        leg_identifier: Option<String>,
        called_address: Option<String>,
    },
}

/// The canonical event shape the reconciler consumes.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub identifier: String,
    /// A second name for the same call (task placeholder) to register as alias.
    pub secondary_identifier: Option<String>,
    pub kind: EventKind,
    pub direction: Option<Direction>,
    pub counterpart_number: Option<String>,
    pub platform_number: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Parent call for child-leg events; such events never create records.
    pub parent_identifier: Option<String>,
}

impl CallEvent {
    /// Only first-progress and task-created events may create a record;
    /// everything else is dropped when the identifier is unknown.
    pub fn creates_record(&self) -> bool {
        match &self.kind {
            EventKind::Progress { .. } => self.direction != Some(Direction::OutboundLeg),
            EventKind::TaskCreated => true,
            _ => false,
        }
    }
}

/// Task placeholder identifier, used until the real call id is known.
pub fn task_placeholder(task_sid: &str) -> String {
    format!("TASK:{task_sid}")
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    match field {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::MalformedEvent(format!("missing {name}"))),
    }
}

/// Provider timestamps come as RFC 2822; fall back to receipt time.
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Endpoints split by direction: the counterpart is the lead's side.
fn split_endpoints(
    direction: Option<Direction>,
    from: Option<String>,
    to: Option<String>,
) -> (Option<String>, Option<String>) {
    match direction {
        Some(Direction::Inbound) => (from, to),
        _ => (to, from),
    }
}

pub fn normalize_progress(p: CallProgressPayload) -> Result<CallEvent> {
    let identifier = required(p.call_sid, "CallSid")?;
    let raw_status = required(p.call_status, "CallStatus")?;
    let status = ProgressStatus::parse(&raw_status)
        .ok_or_else(|| Error::MalformedEvent(format!("unsupported CallStatus {raw_status}")))?;
    let direction = p.direction.as_deref().and_then(Direction::parse);
    let provider_duration = match status {
        ProgressStatus::Completed => p.call_duration.and_then(|d| d.parse::<i64>().ok()),
        _ => None,
    };
    let (counterpart_number, platform_number) = split_endpoints(direction, p.from, p.to);
    Ok(CallEvent {
        identifier,
        secondary_identifier: None,
        kind: EventKind::Progress {
            status,
            provider_duration,
        },
        direction,
        counterpart_number,
        platform_number,
        timestamp: parse_timestamp(p.timestamp.as_deref()),
        parent_identifier: p.parent_call_sid.filter(|s| !s.is_empty()),
    })
}

#[derive(Debug, Default, Deserialize)]
struct TaskAttributes {
    call_sid: Option<String>,
    direction: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

pub fn normalize_task(p: TaskEventPayload) -> Result<CallEvent> {
    let task_sid = required(p.task_sid, "TaskSid")?;
    let event_type = required(p.event_type, "EventType")?;
    let attrs: TaskAttributes = p
        .task_attributes
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let placeholder = task_placeholder(&task_sid);
    let call_sid = attrs.call_sid.filter(|s| !s.is_empty());
    // Events that already know the real call id carry the placeholder as a
    // secondary name so the store can resolve either.
    let (identifier, secondary_identifier) = match &call_sid {
        Some(sid) => (sid.clone(), Some(placeholder)),
        None => (placeholder, None),
    };

    let kind = match event_type.as_str() {
        "task.created" => EventKind::TaskCreated,
        "task.updated" => EventKind::TaskUpdated {
            call_identifier: call_sid,
        },
        "reservation.accepted" => EventKind::ReservationAccepted {
            agent_identifier: p.worker_sid.filter(|s| !s.is_empty()),
            agent_display_name: p.worker_name.filter(|s| !s.is_empty()),
        },
        "task.completed" => EventKind::TaskCompleted,
        other => {
            return Err(Error::MalformedEvent(format!(
                "unsupported EventType {other}"
            )))
        }
    };

    let direction = attrs.direction.as_deref().and_then(Direction::parse);
    let (counterpart_number, platform_number) = split_endpoints(direction, attrs.from, attrs.to);
    Ok(CallEvent {
        identifier,
        secondary_identifier,
        kind,
        direction,
        counterpart_number,
        platform_number,
        timestamp: Utc::now(),
        parent_identifier: None,
    })
}

pub fn normalize_amd(p: AmdPayload) -> Result<CallEvent> {
    let identifier = required(p.call_sid, "CallSid")?;
    let raw = required(p.answered_by, "AnsweredBy")?;
    let verdict = match raw.as_str() {
        "human" => AmdVerdict::Human,
        "fax" => AmdVerdict::Fax,
        s if s.starts_with("machine") => AmdVerdict::Machine,
        _ => AmdVerdict::Unknown,
    };
    Ok(CallEvent {
        identifier,
        secondary_identifier: None,
        kind: EventKind::AmdResult { verdict },
        direction: None,
        counterpart_number: None,
        platform_number: None,
        timestamp: Utc::now(),
        parent_identifier: p.parent_call_sid.filter(|s| !s.is_empty()),
    })
}

/// Returns `Ok(None)` for in-progress recording statuses; only a completed
/// recording attaches a reference.
pub fn normalize_recording(p: RecordingPayload) -> Result<Option<CallEvent>> {
    let identifier = required(p.call_sid, "CallSid")?;
    if p.recording_status.as_deref() != Some("completed") {
        return Ok(None);
    }
    let reference = p
        .recording_url
        .or(p.recording_sid)
        .ok_or_else(|| Error::MalformedEvent("missing recording reference".into()))?;
    Ok(Some(CallEvent {
        identifier,
        secondary_identifier: None,
        kind: EventKind::RecordingReady { reference },
        direction: None,
        counterpart_number: None,
        platform_number: None,
        timestamp: Utc::now(),
        parent_identifier: None,
    }))
}

pub fn normalize_dial(p: DialOutcomePayload) -> Result<CallEvent> {
    let identifier = required(p.call_sid, "CallSid")?;
    let raw = required(p.dial_call_status, "DialCallStatus")?;
    let status = LegStatus::parse(&raw)
        .ok_or_else(|| Error::MalformedEvent(format!("unsupported DialCallStatus {raw}")))?;
    Ok(CallEvent {
        identifier,
        secondary_identifier: None,
        kind: EventKind::DialOutcome {
            status,
            leg_identifier: p.dial_call_sid.filter(|s| !s.is_empty()),
            called_address: p.called.or(p.to).filter(|s| !s.is_empty()),
        },
        direction: None,
        counterpart_number: None,
        platform_number: None,
        timestamp: Utc::now(),
        parent_identifier: None,
    })
}
