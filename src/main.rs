//! Call Ledger Microservice
//!
//! Telephony reconciliation service that folds unordered, duplicated
//! provider webhooks into one authoritative record per call:
//! - Lifecycle reconciler with sticky terminal dispositions
//! - AMD verdicts with bounded override of terminal events
//! - Placeholder identifiers promoted without losing history
//! - Contact tracking, regional routing table, queue/duration metrics
//! - Self-healing disposition sanitizer on terminal transitions
//! - Webhook alert fan-out for completed / missed / failed calls

mod agents;
mod alerts;
mod config;
mod contact;
mod error;
mod event;
mod geo;
mod handlers;
mod metrics;
mod provider;
mod reconcile;
mod record;
mod routes;
mod sanitize;
mod store;

#[cfg(test)]
mod reconcile_tests;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::agents::AgentDirectory;
use crate::alerts::{AlertSink, NullAlertSink, WebhookAlertSink};
use crate::provider::{HttpProviderClient, NullProvider, ProviderClient};
use crate::reconcile::{ReconcilePolicy, Reconciler};
use crate::store::CallStore;

pub use config::Config;
pub use error::{Error, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Reconciler>,
    pub store: Arc<CallStore>,
    pub agents: Arc<AgentDirectory>,
    pub provider: Arc<dyn ProviderClient>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .json()
        .init();

    info!("Starting Call Ledger microservice");

    let config = Arc::new(Config::from_env()?);
    let bind_addr = config.bind_address();

    let store = Arc::new(CallStore::new(
        config.lock_retry_attempts,
        config.lock_retry_base_ms,
    ));
    let agents = Arc::new(AgentDirectory::new());

    let provider: Arc<dyn ProviderClient> = if config.provider_account.is_empty() {
        info!("no provider account configured; using null provider");
        Arc::new(NullProvider)
    } else {
        Arc::new(HttpProviderClient::new(&config))
    };

    let alerts: Arc<dyn AlertSink> = {
        let sink = WebhookAlertSink::new(&config);
        if sink.enabled() {
            Arc::new(sink)
        } else {
            Arc::new(NullAlertSink)
        }
    };

    let policy = ReconcilePolicy {
        short_call_threshold_secs: config.short_call_threshold_secs,
        amd_override_window_secs: config.amd_override_window_secs,
    };
    let engine = Arc::new(Reconciler::new(
        store.clone(),
        agents.clone(),
        provider.clone(),
        alerts,
        policy,
        config.platform_numbers.clone(),
        config.voicemail_media_url.clone(),
    ));

    let state = AppState {
        engine,
        store,
        agents,
        provider,
        config,
    };

    let app = routes::create_router(state);

    info!(address = %bind_addr, "Call Ledger listening");
    let listener = TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
