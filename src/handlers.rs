//! HTTP handlers: provider webhooks and the query API
//!
//! Webhook handlers acknowledge with 204 No Content no matter what happened
//! inside. The provider only needs to know the delivery landed, and a
//! non-2xx would trigger redelivery of an event we already rejected.
//! Malformed or unattributable events are dropped and logged, never turned
//! into record mutations.

use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::{AgentRecord, RegisterAgentRequest};
use crate::error::{Error, Result};
use crate::event::{
    self, AmdPayload, CallProgressPayload, DialOutcomePayload, RecordingPayload, TaskEventPayload,
};
use crate::record::{CallRecord, Direction, Disposition};
use crate::store::CallFilter;
use crate::AppState;

// ============================================
// Webhook Handlers
// ============================================

async fn ingest(state: &AppState, event: crate::event::CallEvent) {
    let identifier = event.identifier.clone();
    match state.engine.apply(event).await {
        Ok(_) => {}
        Err(Error::UnknownIdentifier(id)) => {
            debug!(identifier = %id, "event for unknown call dropped");
        }
        Err(e) => {
            warn!(identifier = %identifier, error = %e, "event could not be applied");
        }
    }
}

pub async fn call_status_webhook(
    State(state): State<AppState>,
    Form(payload): Form<CallProgressPayload>,
) -> StatusCode {
    match event::normalize_progress(payload) {
        Ok(ev) => ingest(&state, ev).await,
        Err(e) => warn!(error = %e, "malformed call-status webhook dropped"),
    }
    StatusCode::NO_CONTENT
}

pub async fn task_webhook(
    State(state): State<AppState>,
    Form(payload): Form<TaskEventPayload>,
) -> StatusCode {
    match event::normalize_task(payload) {
        Ok(ev) => ingest(&state, ev).await,
        Err(e) => warn!(error = %e, "malformed task webhook dropped"),
    }
    StatusCode::NO_CONTENT
}

pub async fn amd_webhook(
    State(state): State<AppState>,
    Form(payload): Form<AmdPayload>,
) -> StatusCode {
    match event::normalize_amd(payload) {
        Ok(ev) => ingest(&state, ev).await,
        Err(e) => warn!(error = %e, "malformed AMD webhook dropped"),
    }
    StatusCode::NO_CONTENT
}

pub async fn recording_webhook(
    State(state): State<AppState>,
    Form(payload): Form<RecordingPayload>,
) -> StatusCode {
    match event::normalize_recording(payload) {
        // None: recording not in a final state yet, nothing to attach.
        Ok(Some(ev)) => ingest(&state, ev).await,
        Ok(None) => {}
        Err(e) => warn!(error = %e, "malformed recording webhook dropped"),
    }
    StatusCode::NO_CONTENT
}

pub async fn dial_webhook(
    State(state): State<AppState>,
    Form(payload): Form<DialOutcomePayload>,
) -> StatusCode {
    match event::normalize_dial(payload) {
        Ok(ev) => ingest(&state, ev).await,
        Err(e) => warn!(error = %e, "malformed dial webhook dropped"),
    }
    StatusCode::NO_CONTENT
}

// ============================================
// Call Query API
// ============================================

#[derive(Debug, Deserialize)]
pub struct CallQuery {
    pub region: Option<String>,
    pub disposition: Option<String>,
    pub direction: Option<String>,
    pub counterpart: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct CallListResponse {
    pub calls: Vec<CallRecord>,
    pub count: usize,
}

pub async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<CallQuery>,
) -> Result<Json<CallListResponse>> {
    let disposition = match query.disposition.as_deref() {
        Some(s) => Some(
            Disposition::parse(s)
                .ok_or_else(|| Error::MalformedEvent(format!("unknown disposition: {s}")))?,
        ),
        None => None,
    };
    let direction = match query.direction.as_deref() {
        Some(s) => Some(
            Direction::parse(s)
                .ok_or_else(|| Error::MalformedEvent(format!("unknown direction: {s}")))?,
        ),
        None => None,
    };
    let filter = CallFilter {
        region: query.region,
        disposition,
        direction,
        counterpart: query.counterpart,
        limit: query.limit.unwrap_or(100),
    };
    let calls = state.store.query(&filter).await;
    let count = calls.len();
    Ok(Json(CallListResponse { calls, count }))
}

pub async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CallRecord>> {
    let rec = state.store.lock(&id).await?;
    Ok(Json(rec.clone()))
}

#[derive(Debug, Default, Serialize)]
pub struct RegionStats {
    pub region: String,
    pub total: u64,
    pub answered: u64,
    pub voicemail: u64,
    pub missed: u64,
    pub failed: u64,
    pub total_duration_secs: i64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub calls_total: usize,
    pub regions: Vec<RegionStats>,
}

pub async fn call_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.store.snapshot().await;
    let calls_total = snapshot.len();

    let mut by_region: std::collections::HashMap<String, RegionStats> =
        std::collections::HashMap::new();
    for rec in snapshot {
        let key = rec.region_code.clone().unwrap_or_else(|| "unknown".into());
        let entry = by_region.entry(key.clone()).or_insert_with(|| RegionStats {
            region: key,
            ..Default::default()
        });
        entry.total += 1;
        entry.total_duration_secs += rec.duration;
        match rec.disposition {
            Disposition::Answered => entry.answered += 1,
            Disposition::Voicemail => entry.voicemail += 1,
            Disposition::NoAnswer | Disposition::Busy | Disposition::Canceled => entry.missed += 1,
            Disposition::Failed => entry.failed += 1,
            Disposition::None => {}
        }
    }

    let mut regions: Vec<RegionStats> = by_region.into_values().collect();
    regions.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.region.cmp(&b.region)));

    Json(StatsResponse {
        calls_total,
        regions,
    })
}

// ============================================
// Originate & Annotate
// ============================================

#[derive(Debug, Deserialize)]
pub struct OriginateRequest {
    pub to: String,
    pub from: Option<String>,
}

#[derive(Serialize)]
pub struct OriginateResponse {
    pub identifier: String,
}

pub async fn originate_call(
    State(state): State<AppState>,
    Json(req): Json<OriginateRequest>,
) -> Result<(StatusCode, Json<OriginateResponse>)> {
    let from = req
        .from
        .as_deref()
        .or_else(|| state.config.default_caller_id())
        .ok_or_else(|| Error::MalformedEvent("no caller id configured".into()))?
        .to_string();

    let identifier = state
        .provider
        .originate_call(&req.to, &from, &state.config.status_callback_url())
        .await?;

    // Seed the record through the engine so contact tracking runs and
    // early webhooks for this call are attributable.
    state
        .engine
        .seed_outbound_call(&identifier, &req.to, &from)
        .await?;

    Ok((StatusCode::CREATED, Json(OriginateResponse { identifier })))
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

pub async fn update_notes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NotesRequest>,
) -> Result<Json<CallRecord>> {
    let mut rec = state.store.lock(&id).await?;
    rec.notes = Some(req.notes);
    rec.updated_at = Utc::now();
    Ok(Json(rec.clone()))
}

// ============================================
// Agent Directory
// ============================================

pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<(StatusCode, Json<AgentRecord>)> {
    if req.identifier.is_empty() || req.address.is_empty() {
        return Err(Error::MalformedEvent(
            "agent identifier and address are required".into(),
        ));
    }
    let agent = state.agents.register(req);
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentRecord>> {
    Json(state.agents.active_agents())
}

// ============================================
// Health
// ============================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub calls_tracked: usize,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "call-ledger".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        calls_tracked: state.store.len(),
    })
}

pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: true })
}
