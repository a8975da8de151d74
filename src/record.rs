//! Call record model
//!
//! The single aggregate the reconciliation engine maintains: one row per
//! real call, keyed by the provider-assigned identifier (or a task
//! placeholder until that identifier is known).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way the call flows. Child legs of an outbound call carry
/// `OutboundLeg` and are always folded into their parent record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Inbound,
    Outbound,
    OutboundLeg,
}

impl Direction {
    /// Parse a provider direction string. Providers tag dialed child legs
    /// as `outbound-dial` and API-originated calls as `outbound-api`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound-dial" | "outbound-leg" => Some(Direction::OutboundLeg),
            s if s.starts_with("outbound") => Some(Direction::Outbound),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::OutboundLeg => "outbound-leg",
        }
    }
}

/// Terminal classification of how a call ended. `None` means the call is
/// still in flight (or no terminal event has arrived yet).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    None,
    Answered,
    Voicemail,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl Disposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Disposition::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::None => "none",
            Disposition::Answered => "answered",
            Disposition::Voicemail => "voicemail",
            Disposition::Busy => "busy",
            Disposition::NoAnswer => "no-answer",
            Disposition::Failed => "failed",
            Disposition::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Disposition::None),
            "answered" => Some(Disposition::Answered),
            "voicemail" => Some(Disposition::Voicemail),
            "busy" => Some(Disposition::Busy),
            "no-answer" => Some(Disposition::NoAnswer),
            "failed" => Some(Disposition::Failed),
            "canceled" => Some(Disposition::Canceled),
            _ => None,
        }
    }
}

/// Local time-of-day bucket used for outreach analytics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContactPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl ContactPeriod {
    /// Bucket a local hour: morning [6,12), afternoon [12,18), evening otherwise.
    pub fn from_local_hour(hour: u32) -> Self {
        match hour {
            6..=11 => ContactPeriod::Morning,
            12..=17 => ContactPeriod::Afternoon,
            _ => ContactPeriod::Evening,
        }
    }
}

/// One authoritative call record, folded together from every webhook source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub identifier: String,
    pub counterpart_number: String,
    pub platform_number: String,
    pub direction: Direction,
    pub region_code: Option<String>,
    pub disposition: Disposition,
    pub started_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Talk time in seconds when answered, total elapsed otherwise.
    pub duration: i64,
    /// Seconds from start to answer.
    pub queue_time: i64,
    pub agent_identifier: Option<String>,
    pub agent_display_name: Option<String>,
    pub recording_reference: Option<String>,
    pub contact_number: u32,
    pub contact_number_today: u32,
    pub previously_answered: bool,
    pub contact_period: Option<ContactPeriod>,
    pub notes: Option<String>,
    /// AMD reported a human pickup; gates the short-call voicemail heuristic.
    pub human_confirmed: bool,
    /// A voicemail-capture sub-flow was started after a dial no-answer.
    pub voicemail_capture: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(
        identifier: &str,
        direction: Direction,
        counterpart_number: &str,
        platform_number: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.to_string(),
            counterpart_number: counterpart_number.to_string(),
            platform_number: platform_number.to_string(),
            direction,
            region_code: None,
            disposition: Disposition::None,
            started_at: Some(started_at),
            answered_at: None,
            ended_at: None,
            duration: 0,
            queue_time: 0,
            agent_identifier: None,
            agent_display_name: None,
            recording_reference: None,
            contact_number: 1,
            contact_number_today: 1,
            previously_answered: false,
            contact_period: None,
            notes: None,
            human_confirmed: false,
            voicemail_capture: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_agent(&self) -> bool {
        self.agent_identifier.is_some() || self.agent_display_name.is_some()
    }
}
