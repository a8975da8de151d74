//! Telephony provider client
//!
//! The side-effecting operations the engine asks of the hosted provider:
//! originate a call, redirect a live call's media, start a recording. The
//! engine depends only on success or failure, never on provider internals,
//! so the client is a trait injected at construction.

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Place an outbound call; returns the provider-assigned call identifier.
    async fn originate_call(&self, to: &str, from: &str, status_callback: &str) -> Result<String>;

    /// Point a live call at a new media URL (voicemail capture, hold, etc).
    async fn redirect_call(&self, identifier: &str, media_url: &str) -> Result<()>;

    /// Start recording a live call.
    async fn start_recording(&self, identifier: &str) -> Result<()>;
}

/// REST client for a Twilio-style provider API.
pub struct HttpProviderClient {
    http: reqwest::Client,
    base_url: String,
    account: String,
    secret: String,
}

impl HttpProviderClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            account: config.provider_account.clone(),
            secret: config.provider_secret.clone(),
        }
    }

    async fn post_form(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = format!("{}/Accounts/{}{}", self.base_url, self.account, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account, Some(&self.secret))
            .form(params)
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "provider returned {} for {}",
                response.status(),
                path
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Provider(e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn originate_call(&self, to: &str, from: &str, status_callback: &str) -> Result<String> {
        let body = self
            .post_form(
                "/Calls.json",
                &[
                    ("To", to),
                    ("From", from),
                    ("StatusCallback", status_callback),
                    ("Record", "true"),
                ],
            )
            .await?;
        let sid = body
            .get("sid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Provider("originate response missing sid".into()))?;
        info!(identifier = %sid, to = %to, "outbound call originated");
        Ok(sid.to_string())
    }

    async fn redirect_call(&self, identifier: &str, media_url: &str) -> Result<()> {
        self.post_form(
            &format!("/Calls/{identifier}.json"),
            &[("Url", media_url), ("Method", "POST")],
        )
        .await?;
        info!(identifier = %identifier, media_url = %media_url, "live call redirected");
        Ok(())
    }

    async fn start_recording(&self, identifier: &str) -> Result<()> {
        self.post_form(
            &format!("/Calls/{identifier}/Recordings.json"),
            &[("RecordingChannels", "dual")],
        )
        .await?;
        info!(identifier = %identifier, "recording started");
        Ok(())
    }
}

/// Provider stand-in for deployments without credentials and for tests.
/// Operations succeed and are only logged.
pub struct NullProvider;

#[async_trait]
impl ProviderClient for NullProvider {
    async fn originate_call(&self, to: &str, _from: &str, _status_callback: &str) -> Result<String> {
        info!(to = %to, "null provider: originate ignored");
        Ok(format!("CA-null-{}", uuid::Uuid::new_v4()))
    }

    async fn redirect_call(&self, identifier: &str, media_url: &str) -> Result<()> {
        info!(identifier = %identifier, media_url = %media_url, "null provider: redirect ignored");
        Ok(())
    }

    async fn start_recording(&self, identifier: &str) -> Result<()> {
        info!(identifier = %identifier, "null provider: start recording ignored");
        Ok(())
    }
}
