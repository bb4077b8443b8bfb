use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use ha2ha_audit::{AuditChain, AuditInput, AuditOutcome, AuditQuery, AuditSink};
use ha2ha_breaker::{check_depth, BreakerRegistry};
use ha2ha_core::card::AgentCard;
use ha2ha_core::constants::CLOCK_SKEW_TOLERANCE_SECS;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TrustLevel};
use ha2ha_identity::{verify_card, AgentKeyPair};
use ha2ha_lifecycle::{
    ApprovalQueue, ApprovalRecord, RejectionRecord, SignaturePolicy, SubmitRequest,
};
use ha2ha_negotiation::negotiate;
use ha2ha_profile::{apply_first_contact, ProfileEnforcer};
use ha2ha_trust::{TrustRegistry, ViolationSeverity};

use crate::error::ApiError;
use crate::headers::validate_headers;
use crate::types::{
    ApproveResponse, AuditNoticeBody, AuditNoticeResponse, AuditQueryParams, AuditQueryResponse,
    EscalateBody, EscalateResponse, RejectResponse, SubmitTaskBody, SubmitTaskResponse,
};

/// How negative profile/trust decisions are applied.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementMode {
    #[default]
    Strict,
    Permissive,
    AuditOnly,
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub clock_skew_tolerance_secs: i64,
    pub enforcement_mode: EnforcementMode,
    pub allow_inbound: bool,
    pub require_approval_signatures: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance_secs: CLOCK_SKEW_TOLERANCE_SECS,
            enforcement_mode: EnforcementMode::Strict,
            allow_inbound: true,
            require_approval_signatures: false,
        }
    }
}

/// Shared state handed to every endpoint handler.
pub struct RpcState {
    pub identity: Arc<AgentKeyPair>,
    pub card: AgentCard,
    pub queue: Arc<ApprovalQueue>,
    pub trust: Arc<TrustRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub audit: Arc<AuditChain>,
    pub enforcer: Option<Arc<ProfileEnforcer>>,
    /// Approver id → hex public key, used when approval signatures are
    /// enforced.
    pub approver_keys: HashMap<String, String>,
    pub config: RpcConfig,
}

/// Handle to a started server; dropping it leaves the server running,
/// `stop` aborts it.
pub struct ServerHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// The HTTP transport surface.
pub struct RpcServer {
    state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcState>) -> Self {
        Self { state }
    }

    /// The well-known endpoint table plus the task ingress.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        Router::new()
            .route("/.well-known/agent.json", get(agent_card))
            .route("/.well-known/ha2ha/v1/task", post(submit_task))
            .route("/.well-known/ha2ha/v1/approve", post(approve))
            .route("/.well-known/ha2ha/v1/reject", post(reject))
            .route("/.well-known/ha2ha/v1/escalate", post(escalate))
            .route("/.well-known/ha2ha/v1/trust/{peer_id}", get(trust_context))
            .route("/.well-known/ha2ha/v1/audit", post(audit_notice).get(audit_query))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Bind `addr` and serve until stopped. Returns a handle carrying the
    /// bound address (useful with port 0).
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("HTTP server stopped: {e}");
            }
        });
        info!(%addr, "HA2HA endpoint surface started");
        Ok(ServerHandle { addr, task })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn agent_card(State(state): State<Arc<RpcState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

async fn submit_task(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitTaskBody>,
) -> Result<Json<SubmitTaskResponse>, ApiError> {
    let now = Utc::now();
    let parsed = validate_headers(&headers, now, state.config.clock_skew_tolerance_secs)?;
    let peer = parsed.agent_id.clone();

    if !state.config.allow_inbound {
        return Err(Ha2haError::FederationDisabled("inbound federation is off".into()).into());
    }

    // Failure isolation first: a tripped peer cannot even queue work.
    state.breakers.check(&peer, now)?;

    if let Some(meta) = &body.workflow {
        check_depth(meta)?;
    }

    let mut warnings = Vec::new();
    if let Some(card) = &body.card {
        if let Err(e) = verify_card(card) {
            // A forged card is a violation, not a benign malformed request.
            state
                .breakers
                .record_failure(&peer, ViolationSeverity::High, "card attestation failed", now);
            return Err(e.into());
        }
        if let Some(enforcer) = &state.enforcer {
            apply_first_contact(enforcer.profile(), &state.trust, Some(&card.name), &peer, now);
        }
        let standing = state.trust.get_or_create(&peer, now).level;
        let result = negotiate(&state.card, card, standing);
        if !result.compatible {
            let error = negotiation_error(&result, card, standing);
            return Err(ApiError::with_data(
                error,
                serde_json::to_value(&result).unwrap_or(json!({})),
            ));
        }
        warnings.extend(result.warnings);
    }

    let entry = state.trust.get_or_create(&peer, now);
    let task = state.queue.submit(
        SubmitRequest {
            task_id: body.task_id,
            source: peer,
            target: state.identity.agent_id.clone(),
            payload: body.payload,
            description: body.description,
            timeout_secs: body.timeout_secs,
            trust_at_submission: entry.level,
            workflow: body.workflow,
        },
        now,
    )?;

    Ok(Json(SubmitTaskResponse { task, warnings }))
}

/// Reconstruct the closed error kind behind an incompatible negotiation.
fn negotiation_error(
    result: &ha2ha_negotiation::NegotiationResult,
    card: &AgentCard,
    standing: TrustLevel,
) -> Ha2haError {
    if let Some(uri) = result.missing_required.first() {
        return Ha2haError::ExtensionMissing { uri: uri.clone() };
    }
    if let Some(Ok(params)) = card.ha2ha_params() {
        if !params.human_oversight {
            return Ha2haError::OversightDisabled;
        }
        if let Some(required) = TrustLevel::from_u8(params.minimum_trust_level) {
            if standing < required {
                return Ha2haError::TrustLevelInsufficient { required, standing };
            }
        }
    }
    Ha2haError::ExtensionParameterInvalid(
        result.error.clone().unwrap_or_else(|| "negotiation failed".into()),
    )
}

async fn approve(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(approval): Json<ApprovalRecord>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let now = Utc::now();
    validate_headers(&headers, now, state.config.clock_skew_tolerance_secs)?;

    let mut warnings = Vec::new();
    if let Some(enforcer) = &state.enforcer {
        let gate = enforcer.can_approve(now);
        if !gate.allowed {
            match state.config.enforcement_mode {
                EnforcementMode::Strict => {
                    return Err(ApiError::with_data(
                        Ha2haError::ApproverNotQualified(approval.approver.clone()),
                        json!({
                            "suggestedAction": gate.suggested_action,
                            "nextAvailable": gate.next_available,
                        }),
                    ));
                }
                EnforcementMode::Permissive | EnforcementMode::AuditOnly => {
                    warn!(approver = %approval.approver, "off-hours approval admitted");
                    warnings.push("approver is outside their availability window".into());
                }
            }
        }
        warnings.extend(gate.warnings);
    }

    let policy = if state.config.require_approval_signatures {
        SignaturePolicy {
            enforce: true,
            approver_key: state.approver_keys.get(&approval.approver).cloned(),
        }
    } else {
        SignaturePolicy::disabled()
    };

    let task = state.queue.approve(&approval, &policy, now)?;
    if let Some(enforcer) = &state.enforcer {
        enforcer.record_approval(now);
    }
    Ok(Json(ApproveResponse { task, warnings }))
}

async fn reject(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(rejection): Json<RejectionRecord>,
) -> Result<Json<RejectResponse>, ApiError> {
    let now = Utc::now();
    validate_headers(&headers, now, state.config.clock_skew_tolerance_secs)?;
    let task = state.queue.reject(&rejection, now)?;
    Ok(Json(RejectResponse { task }))
}

async fn escalate(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(body): Json<EscalateBody>,
) -> Result<Json<EscalateResponse>, ApiError> {
    let now = Utc::now();
    let parsed = validate_headers(&headers, now, state.config.clock_skew_tolerance_secs)?;

    let task = state
        .queue
        .get(&body.task_id)
        .ok_or_else(|| Ha2haError::TaskNotFound(body.task_id.to_string()))?;

    // The escalation contact comes from our own card's extension params.
    let contact = body.contact.or_else(|| {
        state
            .card
            .ha2ha_params()
            .and_then(|p| p.ok())
            .and_then(|p| p.escalation_contact)
    });

    state.audit.record(
        AuditInput::new(
            ha2ha_audit::AuditEventType::TaskEscalated,
            parsed.agent_id,
            state.identity.agent_id.clone(),
            AuditOutcome::Pending,
        )
        .task(task.id.clone())
        .trust(task.trust_at_submission)
        .detail(json!({"reason": body.reason, "contact": contact})),
    );

    Ok(Json(EscalateResponse {
        escalated: true,
        contact,
    }))
}

async fn trust_context(
    State(state): State<Arc<RpcState>>,
    Path(peer_id): Path<String>,
) -> Result<Json<ha2ha_trust::TrustContext>, ApiError> {
    let peer = AgentId::new(peer_id);
    state
        .trust
        .context(&peer)
        .map(Json)
        .ok_or_else(|| Ha2haError::PeerNotFound(peer.to_string()).into())
}

async fn audit_notice(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(body): Json<AuditNoticeBody>,
) -> Result<Json<AuditNoticeResponse>, ApiError> {
    let now = Utc::now();
    let parsed = validate_headers(&headers, now, state.config.clock_skew_tolerance_secs)?;
    let peer = parsed.agent_id;

    let trust = state.trust.level_of(&peer).unwrap_or_default();
    let mut input = AuditInput::new(
        body.event_type,
        peer,
        state.identity.agent_id.clone(),
        body.outcome,
    )
    .trust(trust)
    .detail(body.detail);
    if let Some(task_id) = body.task_id {
        input = input.task(task_id);
    }

    let entry = state.audit.append(input)?;
    Ok(Json(AuditNoticeResponse {
        recorded: true,
        seq: entry.seq,
    }))
}

async fn audit_query(
    State(state): State<Arc<RpcState>>,
    Query(params): Query<AuditQueryParams>,
) -> Json<AuditQueryResponse> {
    let query = AuditQuery {
        event_types: params.event_type.map(|t| vec![t]),
        task_id: params.task_id,
        source: params.source,
        target: params.target,
        human_id: params.human_id,
        outcome: params.outcome,
        start: params.start,
        end: params.end,
        descending: params.order.as_deref() == Some("desc"),
        offset: params.offset.unwrap_or(0),
        limit: params.limit,
    };
    let entries = state.audit.query(&query);
    let count = entries.len();
    Json(AuditQueryResponse { entries, count })
}
