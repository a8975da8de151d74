//! Status-change alerting
//!
//! Pushes a short notification to a chat webhook when a call reaches a
//! state someone cares about. The sink is a collaborator injected into the
//! engine; delivery failures are logged and never propagate into event
//! processing.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::record::{CallRecord, Direction, Disposition};

/// Snapshot of the fields worth alerting on.
#[derive(Debug, Clone)]
pub struct CallAlert {
    pub identifier: String,
    pub counterpart_number: String,
    pub platform_number: String,
    pub direction: Direction,
    pub disposition: Disposition,
    pub duration: i64,
    pub region_code: Option<String>,
    pub agent_display_name: Option<String>,
    pub recording_reference: Option<String>,
}

impl CallAlert {
    pub fn from_record(rec: &CallRecord) -> Self {
        Self {
            identifier: rec.identifier.clone(),
            counterpart_number: rec.counterpart_number.clone(),
            platform_number: rec.platform_number.clone(),
            direction: rec.direction,
            disposition: rec.disposition,
            duration: rec.duration,
            region_code: rec.region_code.clone(),
            agent_display_name: rec.agent_display_name.clone(),
            recording_reference: rec.recording_reference.clone(),
        }
    }

    fn headline(&self) -> &'static str {
        match self.disposition {
            Disposition::Answered => "Call Completed",
            Disposition::Voicemail => "Voicemail",
            Disposition::NoAnswer => "Missed Call",
            Disposition::Busy => "Line Busy",
            Disposition::Failed => "Call Failed",
            Disposition::Canceled => "Call Canceled",
            Disposition::None => "Call Update",
        }
    }
}

/// Format seconds as `4m 5s` for humans.
fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else {
        format!("{}m {}s", seconds / 60, seconds % 60)
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify_call_status(&self, alert: &CallAlert);
    async fn notify_recording_ready(&self, alert: &CallAlert);
}

/// Chat webhook sink with per-status toggles.
pub struct WebhookAlertSink {
    http: reqwest::Client,
    webhook_url: String,
    on_completed: bool,
    on_missed: bool,
    on_failed: bool,
    on_recording: bool,
}

impl WebhookAlertSink {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: config.alert_webhook_url.clone(),
            on_completed: config.alert_on_completed,
            on_missed: config.alert_on_missed,
            on_failed: config.alert_on_failed,
            on_recording: config.alert_on_recording,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    fn should_alert(&self, disposition: Disposition) -> bool {
        match disposition {
            Disposition::Answered | Disposition::Voicemail => self.on_completed,
            Disposition::NoAnswer | Disposition::Busy | Disposition::Canceled => self.on_missed,
            Disposition::Failed => self.on_failed,
            Disposition::None => false,
        }
    }

    async fn deliver(&self, alert: &CallAlert, headline: &str) {
        let region = alert.region_code.as_deref().unwrap_or("Unknown");
        let mut lines = vec![
            format!("From: {}", alert.counterpart_number),
            format!("To: {}", alert.platform_number),
            format!("Region: {region}"),
            format!("Duration: {}", format_duration(alert.duration)),
        ];
        if let Some(agent) = &alert.agent_display_name {
            lines.push(format!("Agent: {agent}"));
        }
        if let Some(recording) = &alert.recording_reference {
            lines.push(format!("Recording: {recording}"));
        }
        let payload = json!({
            "text": format!(
                "{headline}: {} -> {} ({})",
                alert.counterpart_number,
                alert.platform_number,
                alert.disposition.as_str()
            ),
            "details": lines.join("\n"),
            "call_identifier": alert.identifier,
        });

        match self.http.post(&self.webhook_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(identifier = %alert.identifier, "alert delivered");
            }
            Ok(resp) => {
                warn!(identifier = %alert.identifier, status = %resp.status(), "alert webhook rejected payload");
            }
            Err(e) => {
                warn!(identifier = %alert.identifier, error = %e, "alert delivery failed");
            }
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify_call_status(&self, alert: &CallAlert) {
        if !self.enabled() || !self.should_alert(alert.disposition) {
            debug!(identifier = %alert.identifier, "skipping status alert");
            return;
        }
        self.deliver(alert, alert.headline()).await;
    }

    async fn notify_recording_ready(&self, alert: &CallAlert) {
        if !self.enabled() || !self.on_recording || alert.recording_reference.is_none() {
            return;
        }
        self.deliver(alert, "Recording Ready").await;
    }
}

/// Sink that swallows everything; used in tests and when alerting is off.
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn notify_call_status(&self, _alert: &CallAlert) {}
    async fn notify_recording_ready(&self, _alert: &CallAlert) {}
}
