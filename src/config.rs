//! Configuration for the call ledger service

use std::net::SocketAddr;

/// Service configuration, loaded from environment variables.
///
/// The short-call threshold and the AMD override window are policy knobs,
/// not laws: both reproduce observed provider behavior and can be tuned
/// per deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Telephony provider API base URL
    pub provider_base_url: String,
    /// Provider account identifier
    pub provider_account: String,
    /// Provider auth secret
    pub provider_secret: String,
    /// Publicly reachable base URL for our webhook callbacks
    pub public_base_url: String,
    /// Caller IDs this platform dials out from (comma separated).
    /// Also the contact tracker's not-a-lead exclusion list.
    pub platform_numbers: Vec<String>,
    /// Media URL a no-answer call is redirected to for voicemail capture
    pub voicemail_media_url: String,
    /// Alert webhook URL; alerting is disabled when empty
    pub alert_webhook_url: String,
    pub alert_on_completed: bool,
    pub alert_on_missed: bool,
    pub alert_on_failed: bool,
    pub alert_on_recording: bool,
    /// Outbound calls answered for less than this many seconds with no
    /// human confirmation are treated as voicemail
    pub short_call_threshold_secs: i64,
    /// How long after a call ends an AMD verdict may still override it
    pub amd_override_window_secs: i64,
    /// Bounded per-record lock retries
    pub lock_retry_attempts: u32,
    pub lock_retry_base_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8110".to_string())
                .parse()?,
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.twilio.com/2010-04-01".to_string()),
            provider_account: std::env::var("PROVIDER_ACCOUNT_SID").unwrap_or_default(),
            provider_secret: std::env::var("PROVIDER_AUTH_TOKEN").unwrap_or_default(),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8110".to_string()),
            platform_numbers: std::env::var("PLATFORM_NUMBERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            voicemail_media_url: std::env::var("VOICEMAIL_MEDIA_URL").unwrap_or_default(),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").unwrap_or_default(),
            alert_on_completed: env_flag("ALERT_ON_COMPLETED", true),
            alert_on_missed: env_flag("ALERT_ON_MISSED", true),
            alert_on_failed: env_flag("ALERT_ON_FAILED", true),
            alert_on_recording: env_flag("ALERT_ON_RECORDING", false),
            short_call_threshold_secs: std::env::var("SHORT_CALL_THRESHOLD_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            amd_override_window_secs: std::env::var("AMD_OVERRIDE_WINDOW_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
            lock_retry_attempts: std::env::var("LOCK_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            lock_retry_base_ms: std::env::var("LOCK_RETRY_BASE_MS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        })
    }

    /// Get socket address for binding
    pub fn bind_address(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid bind address")
    }

    /// Default outbound caller ID
    pub fn default_caller_id(&self) -> Option<&str> {
        self.platform_numbers.first().map(|s| s.as_str())
    }

    /// Webhook URL the provider posts call progress to
    pub fn status_callback_url(&self) -> String {
        format!("{}/webhooks/call-status", self.public_base_url)
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
