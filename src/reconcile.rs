//! Lifecycle reconciler
//!
//! Folds normalized webhook events into the authoritative call record.
//! Events arrive at least once, out of order, and occasionally contradict
//! each other; the transition rules here make the precedence explicit:
//! terminal dispositions are sticky, an AMD machine verdict beats a later
//! terminal event inside a bounded window, and a call is never "answered"
//! without a resolved agent.
//!
//! Dispatch is a match over the event kind and the record's current
//! disposition rather than a chain of conditionals, so each precedence rule
//! is auditable in isolation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::agents::AgentDirectory;
use crate::alerts::{AlertSink, CallAlert};
use crate::contact;
use crate::error::{Error, Result};
use crate::event::{AmdVerdict, CallEvent, EventKind, LegStatus, ProgressStatus};
use crate::geo;
use crate::metrics;
use crate::provider::ProviderClient;
use crate::record::{CallRecord, Direction, Disposition};
use crate::sanitize;
use crate::store::CallStore;

/// Tunable heuristics. Both reproduce observed provider behavior rather
/// than documented guarantees, so they are policy, not law.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    /// Outbound calls answered for less than this with no human
    /// confirmation are classified as voicemail.
    pub short_call_threshold_secs: i64,
    /// How long after a call ended an AMD verdict may still override its
    /// disposition. Later verdicts are left to the sanitizer.
    pub amd_override_window_secs: i64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            short_call_threshold_secs: 15,
            amd_override_window_secs: 120,
        }
    }
}

/// What applying one event did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Terminal,
    NoOp,
}

#[derive(Clone, Copy)]
enum Step {
    Ignored(&'static str),
    Updated,
    Terminal,
    /// Terminal no-answer that also starts the voicemail-capture sub-flow.
    VoicemailCapture,
}

pub struct Reconciler {
    store: Arc<CallStore>,
    agents: Arc<AgentDirectory>,
    provider: Arc<dyn ProviderClient>,
    alerts: Arc<dyn AlertSink>,
    policy: ReconcilePolicy,
    platform_numbers: Vec<String>,
    voicemail_media_url: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<CallStore>,
        agents: Arc<AgentDirectory>,
        provider: Arc<dyn ProviderClient>,
        alerts: Arc<dyn AlertSink>,
        policy: ReconcilePolicy,
        platform_numbers: Vec<String>,
        voicemail_media_url: String,
    ) -> Self {
        Self {
            store,
            agents,
            provider,
            alerts,
            policy,
            platform_numbers,
            voicemail_media_url,
        }
    }

    /// Apply one normalized event: one bounded read-modify-write of one
    /// record, serialized per identifier by the store's record lock.
    pub async fn apply(&self, event: CallEvent) -> Result<Applied> {
        let mut created = false;
        let entry = self
            .store
            .resolve(&event.identifier)
            .or_else(|| {
                event
                    .secondary_identifier
                    .as_deref()
                    .and_then(|id| self.store.resolve(id))
            })
            .or_else(|| {
                // Child-leg events fold into their parent record.
                event
                    .parent_identifier
                    .as_deref()
                    .and_then(|id| self.store.resolve(id))
            });

        let entry = match entry {
            Some(entry) => entry,
            None => {
                if !event.creates_record() {
                    return Err(Error::UnknownIdentifier(event.identifier.clone()));
                }
                let record = self.build_record(&event).await;
                let (entry, inserted) = self.store.insert_or_get(record);
                if inserted {
                    created = true;
                    info!(
                        identifier = %event.identifier,
                        direction = event.direction.unwrap_or(Direction::Inbound).as_str(),
                        "call record created"
                    );
                }
                entry
            }
        };

        let mut rec = self.store.lock_entry(entry, &event.identifier).await?;

        if let Some(alias) = &event.secondary_identifier {
            self.store.add_alias(alias, &rec.identifier);
        }
        if let EventKind::TaskUpdated {
            call_identifier: Some(real),
        } = &event.kind
        {
            if rec.identifier != *real {
                self.store.promote(&rec.identifier, real);
                info!(placeholder = %rec.identifier, identifier = %real, "placeholder identifier promoted");
                rec.identifier = real.clone();
            }
        }

        let step = transition(&mut rec, &event, &self.policy, &self.agents);

        if let Step::Ignored(reason) = step {
            debug!(identifier = %rec.identifier, reason, "event ignored");
            return Ok(if created { Applied::Created } else { Applied::NoOp });
        }
        rec.updated_at = Utc::now();

        let terminal = matches!(step, Step::Terminal | Step::VoicemailCapture);
        let capture = matches!(step, Step::VoicemailCapture);
        let mut status_alert = None;
        if terminal {
            sanitize::sanitize_and_log(&mut rec);
            status_alert = Some(CallAlert::from_record(&rec));
        }
        let recording_alert = match &event.kind {
            EventKind::RecordingReady { .. } => Some(CallAlert::from_record(&rec)),
            _ => None,
        };
        let identifier = rec.identifier.clone();
        drop(rec);

        // Side effects happen outside the record's critical section.
        if capture {
            self.start_voicemail_capture(&identifier).await;
        }
        if let Some(alert) = status_alert {
            self.alerts.notify_call_status(&alert).await;
        }
        if let Some(alert) = recording_alert {
            self.alerts.notify_recording_ready(&alert).await;
        }

        Ok(if created {
            Applied::Created
        } else if terminal {
            Applied::Terminal
        } else {
            Applied::Updated
        })
    }

    /// Seed a record for an API-originated call before its first webhook
    /// arrives. Goes through the ordinary creation path so contact tracking
    /// runs and early deliveries are attributable.
    pub async fn seed_outbound_call(&self, identifier: &str, to: &str, from: &str) -> Result<()> {
        self.apply(CallEvent {
            identifier: identifier.to_string(),
            secondary_identifier: None,
            kind: EventKind::Progress {
                status: ProgressStatus::Initiated,
                provider_duration: None,
            },
            direction: Some(Direction::Outbound),
            counterpart_number: Some(to.to_string()),
            platform_number: Some(from.to_string()),
            timestamp: Utc::now(),
            parent_identifier: None,
        })
        .await
        .map(|_| ())
    }

    /// Build a fresh record for a first-seen identifier. Contact tracking
    /// runs exactly here, against records that existed before this one.
    async fn build_record(&self, event: &CallEvent) -> CallRecord {
        let direction = event.direction.unwrap_or(Direction::Inbound);
        let counterpart = event.counterpart_number.clone().unwrap_or_default();
        let platform = event.platform_number.clone().unwrap_or_default();
        let mut rec = CallRecord::new(
            &event.identifier,
            direction,
            &counterpart,
            &platform,
            event.timestamp,
        );
        rec.region_code = geo::region_for_number(&counterpart).map(String::from);
        let summary = contact::summarize(
            &self.store,
            &counterpart,
            &self.platform_numbers,
            rec.region_code.as_deref(),
            event.timestamp,
            &event.identifier,
        )
        .await;
        rec.contact_number = summary.contact_number;
        rec.contact_number_today = summary.contact_number_today;
        rec.previously_answered = summary.previously_answered;
        rec.contact_period = Some(summary.contact_period);
        rec
    }

    async fn start_voicemail_capture(&self, identifier: &str) {
        if self.voicemail_media_url.is_empty() {
            debug!(identifier = %identifier, "no voicemail media url configured; skipping capture");
            return;
        }
        if let Err(e) = self
            .provider
            .redirect_call(identifier, &self.voicemail_media_url)
            .await
        {
            warn!(identifier = %identifier, error = %e, "voicemail redirect failed");
            return;
        }
        if let Err(e) = self.provider.start_recording(identifier).await {
            warn!(identifier = %identifier, error = %e, "voicemail recording failed to start");
        }
    }
}

fn mark_answered(rec: &mut CallRecord, ts: chrono::DateTime<Utc>) {
    if rec.answered_at.is_none() {
        rec.answered_at = Some(ts);
        rec.queue_time = metrics::queue_time(rec);
    }
}

fn transition(
    rec: &mut CallRecord,
    event: &CallEvent,
    policy: &ReconcilePolicy,
    agents: &AgentDirectory,
) -> Step {
    let terminal_before = rec.disposition.is_terminal();
    match &event.kind {
        EventKind::Progress {
            status,
            provider_duration,
        } => progress_transition(rec, *status, *provider_duration, event, policy, terminal_before),

        EventKind::TaskCreated => {
            if rec.started_at.is_none() {
                rec.started_at = Some(event.timestamp);
            }
            Step::Updated
        }

        // Identifier promotion already happened in the caller.
        EventKind::TaskUpdated { .. } => Step::Updated,

        EventKind::TaskCompleted => Step::Ignored("task completion is informational"),

        EventKind::ReservationAccepted {
            agent_identifier,
            agent_display_name,
        } => {
            if terminal_before {
                return Step::Ignored("terminal disposition is sticky");
            }
            mark_answered(rec, event.timestamp);
            if agent_identifier.is_some() {
                rec.agent_identifier = agent_identifier.clone();
            }
            if agent_display_name.is_some() {
                rec.agent_display_name = agent_display_name.clone();
            }
            Step::Updated
        }

        EventKind::AmdResult { verdict } => {
            amd_transition(rec, *verdict, event, policy, terminal_before)
        }

        EventKind::RecordingReady { reference } => {
            if rec.recording_reference.is_none() {
                rec.recording_reference = Some(reference.clone());
            }
            // A recording captured after a dial no-answer means the caller
            // left voicemail.
            if rec.voicemail_capture && rec.disposition == Disposition::NoAnswer {
                rec.disposition = Disposition::Voicemail;
                Step::Terminal
            } else {
                Step::Updated
            }
        }

        EventKind::DialOutcome {
            status,
            leg_identifier,
            called_address,
        } => {
            if terminal_before {
                return Step::Ignored("terminal disposition is sticky");
            }
            dial_transition(
                rec,
                *status,
                leg_identifier.as_deref(),
                called_address.as_deref(),
                event,
                agents,
            )
        }
    }
}

fn progress_transition(
    rec: &mut CallRecord,
    status: ProgressStatus,
    provider_duration: Option<i64>,
    event: &CallEvent,
    policy: &ReconcilePolicy,
    terminal_before: bool,
) -> Step {
    match status {
        ProgressStatus::Initiated | ProgressStatus::Ringing => {
            if terminal_before {
                return Step::Ignored("terminal disposition is sticky");
            }
            if rec.started_at.is_none() {
                rec.started_at = Some(event.timestamp);
            }
            Step::Updated
        }

        ProgressStatus::InProgress => {
            if terminal_before {
                return Step::Ignored("terminal disposition is sticky");
            }
            mark_answered(rec, event.timestamp);
            Step::Updated
        }

        ProgressStatus::Completed => {
            if terminal_before && rec.ended_at.is_some() {
                return Step::Ignored("duplicate terminal event");
            }
            if rec.ended_at.is_none() {
                rec.ended_at = Some(event.timestamp);
            }
            rec.duration =
                metrics::effective_duration(metrics::call_duration(rec), provider_duration);
            if !terminal_before {
                rec.disposition = completed_disposition(rec, policy);
            }
            Step::Terminal
        }

        ProgressStatus::Busy => failure_transition(rec, Disposition::Busy, event, terminal_before),
        ProgressStatus::NoAnswer => {
            failure_transition(rec, Disposition::NoAnswer, event, terminal_before)
        }
        ProgressStatus::Canceled => {
            failure_transition(rec, Disposition::Canceled, event, terminal_before)
        }
        ProgressStatus::Failed => {
            failure_transition(rec, Disposition::Failed, event, terminal_before)
        }
    }
}

/// Disposition for a completed call that nothing terminal touched yet.
fn completed_disposition(rec: &CallRecord, policy: &ReconcilePolicy) -> Disposition {
    if rec.answered_at.is_none() {
        return Disposition::NoAnswer;
    }
    // Heuristic: AMD is unreliable on outbound calls; a pickup shorter than
    // the threshold with no human confirmation is almost always a machine.
    if rec.direction == Direction::Outbound
        && rec.duration < policy.short_call_threshold_secs
        && !rec.human_confirmed
    {
        debug!(
            identifier = %rec.identifier,
            duration = rec.duration,
            threshold = policy.short_call_threshold_secs,
            "short outbound call classified as voicemail"
        );
        return Disposition::Voicemail;
    }
    Disposition::Answered
}

fn failure_transition(
    rec: &mut CallRecord,
    disposition: Disposition,
    event: &CallEvent,
    terminal_before: bool,
) -> Step {
    if terminal_before {
        // An AMD voicemail verdict wins over the provider's terminal
        // status; only the timing still needs closing out.
        if rec.disposition == Disposition::Voicemail && rec.ended_at.is_none() {
            rec.ended_at = Some(event.timestamp);
            rec.duration = metrics::effective_duration(metrics::call_duration(rec), None);
            return Step::Terminal;
        }
        return Step::Ignored("terminal disposition is sticky");
    }
    if rec.ended_at.is_none() {
        rec.ended_at = Some(event.timestamp);
    }
    rec.duration = metrics::effective_duration(metrics::call_duration(rec), None);
    rec.disposition = disposition;
    Step::Terminal
}

fn amd_transition(
    rec: &mut CallRecord,
    verdict: AmdVerdict,
    event: &CallEvent,
    policy: &ReconcilePolicy,
    terminal_before: bool,
) -> Step {
    match verdict {
        AmdVerdict::Human => {
            rec.human_confirmed = true;
            Step::Updated
        }
        AmdVerdict::Unknown => Step::Ignored("inconclusive AMD verdict"),
        AmdVerdict::Machine | AmdVerdict::Fax => {
            if rec.disposition == Disposition::Voicemail {
                return Step::Ignored("already voicemail");
            }
            if terminal_before {
                let within_window = rec
                    .ended_at
                    .map(|ended| {
                        (event.timestamp - ended).num_seconds().abs()
                            <= policy.amd_override_window_secs
                    })
                    .unwrap_or(true);
                if !within_window {
                    warn!(
                        identifier = %rec.identifier,
                        disposition = rec.disposition.as_str(),
                        "late AMD verdict outside override window; leaving record to the sanitizer"
                    );
                    return Step::Ignored("AMD verdict outside override window");
                }
                info!(
                    identifier = %rec.identifier,
                    before = rec.disposition.as_str(),
                    "AMD machine verdict overrides terminal disposition"
                );
            }
            rec.disposition = Disposition::Voicemail;
            if rec.ended_at.is_some() {
                Step::Terminal
            } else {
                Step::Updated
            }
        }
    }
}

fn dial_transition(
    rec: &mut CallRecord,
    status: LegStatus,
    leg_identifier: Option<&str>,
    called_address: Option<&str>,
    event: &CallEvent,
    agents: &AgentDirectory,
) -> Step {
    match status {
        LegStatus::Completed => {
            match called_address.and_then(|addr| agents.resolve_by_address(addr)) {
                Some(agent) => {
                    rec.agent_identifier = Some(agent.identifier);
                    rec.agent_display_name = Some(agent.display_name);
                    mark_answered(rec, event.timestamp);
                    rec.disposition = Disposition::Answered;
                }
                None => {
                    // Never leave a call answered by nobody.
                    warn!(
                        identifier = %rec.identifier,
                        leg = leg_identifier.unwrap_or("-"),
                        called = called_address.unwrap_or("-"),
                        "connected leg resolves to no agent; marking no-answer"
                    );
                    rec.disposition = Disposition::NoAnswer;
                }
            }
            Step::Terminal
        }
        LegStatus::NoAnswer => {
            rec.disposition = Disposition::NoAnswer;
            rec.voicemail_capture = true;
            Step::VoicemailCapture
        }
        LegStatus::Busy => {
            rec.disposition = Disposition::Busy;
            Step::Terminal
        }
        LegStatus::Failed => {
            rec.disposition = Disposition::Failed;
            Step::Terminal
        }
        LegStatus::Canceled => {
            rec.disposition = Disposition::Canceled;
            Step::Terminal
        }
    }
}
