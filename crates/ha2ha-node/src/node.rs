//! Component wiring.
//!
//! The host owns the startup order (identity, audit chain, trust registry,
//! breaker registry, approval queue, profile enforcer), wires the narrow
//! ports between them, and hands the lot to the transport surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ha2ha_audit::{AuditChain, AuditSink};
use ha2ha_breaker::{BreakerConfig, BreakerRegistry};
use ha2ha_core::card::{AgentCard, Ha2haParams};
use ha2ha_core::constants::PROTOCOL_VERSION;
use ha2ha_core::types::AgentId;
use ha2ha_identity::{sign_card, AgentKeyPair};
use ha2ha_lifecycle::{ApprovalQueue, TaskStore};
use ha2ha_profile::{ApproverProfile, ProfileEnforcer};
use ha2ha_rpc::{RpcConfig, RpcState};
use ha2ha_trust::{TransitionReason, TrustRegistry, TrustSink, TrustStore};

use crate::config::Ha2haConfig;

pub struct NodeOptions {
    pub data_dir: PathBuf,
    pub agent_id: AgentId,
    pub display_name: Option<String>,
    /// Public base URL advertised on the Agent Card.
    pub url: String,
    pub capabilities: Vec<String>,
    pub config: Ha2haConfig,
}

pub struct Node {
    pub identity: Arc<AgentKeyPair>,
    pub card: AgentCard,
    pub audit: Arc<AuditChain>,
    pub trust: Arc<TrustRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub queue: Arc<ApprovalQueue>,
    pub enforcer: Option<Arc<ProfileEnforcer>>,
    pub rpc_config: RpcConfig,
}

impl Node {
    /// Build and wire every component from the host options.
    pub fn build(options: NodeOptions) -> anyhow::Result<Self> {
        let data_dir = &options.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        // ── Identity ─────────────────────────────────────────────────────────
        let identity = Arc::new(
            AgentKeyPair::load_or_create(
                &data_dir.join("identity.json"),
                options.agent_id.clone(),
                options.display_name.clone(),
            )
            .context("loading identity")?,
        );

        // ── Audit chain (verify on open) ─────────────────────────────────────
        let audit_path = data_dir
            .join("audit")
            .join(format!("{}.ndjson", identity.agent_id));
        let audit = Arc::new(
            AuditChain::open(&audit_path, identity.agent_id.clone(), true)
                .context("opening audit chain")?,
        );
        let audit_sink: Arc<dyn AuditSink> = Arc::clone(&audit) as Arc<dyn AuditSink>;

        // ── Trust registry ───────────────────────────────────────────────────
        let trust_path = options
            .config
            .trust_store
            .clone()
            .unwrap_or_else(|| data_dir.join("trust-store"))
            .join("agents.json");
        let trust = Arc::new(
            TrustRegistry::open(
                identity.agent_id.clone(),
                Some(TrustStore::new(trust_path)),
                Arc::clone(&audit_sink),
            )
            .context("opening trust store")?,
        );
        let trust_sink: Arc<dyn TrustSink> = Arc::clone(&trust) as Arc<dyn TrustSink>;

        // Seed configured peers without touching existing entries.
        let now = Utc::now();
        for agent in &options.config.federation.known_agents {
            let level = agent.trust_level.unwrap_or_default();
            trust.seed_if_absent(&agent.id, level, TransitionReason::ManualOverride, now);
        }

        // ── Circuit breakers ─────────────────────────────────────────────────
        let breakers = Arc::new(
            BreakerRegistry::new(identity.agent_id.clone(), BreakerConfig::default())
                .with_trust(Arc::clone(&trust_sink))
                .with_audit(Arc::clone(&audit_sink)),
        );

        // ── Approval queue ───────────────────────────────────────────────────
        let queue = Arc::new(
            ApprovalQueue::new(identity.agent_id.clone(), Arc::clone(&audit_sink))
                .with_store(TaskStore::new(data_dir.join("pending")))
                .context("restoring approval queue")?
                .with_trust(Arc::clone(&trust_sink)),
        );

        // ── Profile enforcer ─────────────────────────────────────────────────
        let enforcer = match &options.config.profile {
            Some(path) => {
                let profile = ApproverProfile::load(path).context("loading approver profile")?;
                info!(approver = %profile.id, "approver profile loaded");
                Some(Arc::new(ProfileEnforcer::new(profile)))
            }
            None => {
                warn!("no approver profile configured; availability is unrestricted");
                None
            }
        };

        // ── Agent Card ───────────────────────────────────────────────────────
        let params = Ha2haParams {
            spec_version: PROTOCOL_VERSION.to_string(),
            human_oversight: true,
            minimum_trust_level: 1,
            audit_endpoint: Some(format!("{}/.well-known/ha2ha/v1/audit", options.url)),
            escalation_contact: enforcer.as_ref().map(|e| e.profile().id.clone()),
            supported_versions: None,
        };
        let mut card = AgentCard::new(
            identity.agent_id.to_string(),
            env!("CARGO_PKG_VERSION"),
            options.url.clone(),
            options.capabilities.clone(),
            identity.public_key_hex().to_string(),
        )
        .with_ha2ha_extension(&params)
        .map_err(|e| anyhow::anyhow!("building agent card: {e}"))?;
        sign_card(&mut card, &identity).map_err(|e| anyhow::anyhow!("signing agent card: {e}"))?;

        let rpc_config = RpcConfig {
            enforcement_mode: options.config.enforcement.mode,
            allow_inbound: options.config.federation.allow_inbound,
            ..RpcConfig::default()
        };

        Ok(Self {
            identity,
            card,
            audit,
            trust,
            breakers,
            queue,
            enforcer,
            rpc_config,
        })
    }

    /// State handed to the HTTP surface.
    pub fn rpc_state(&self) -> Arc<RpcState> {
        Arc::new(RpcState {
            identity: Arc::clone(&self.identity),
            card: self.card.clone(),
            queue: Arc::clone(&self.queue),
            trust: Arc::clone(&self.trust),
            breakers: Arc::clone(&self.breakers),
            audit: Arc::clone(&self.audit),
            enforcer: self.enforcer.clone(),
            approver_keys: HashMap::new(),
            config: self.rpc_config.clone(),
        })
    }

    /// Periodic timeout sweeper. The returned handle is owned by the host;
    /// aborting it stops the sweeper.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = queue.sweep_timeouts(Utc::now());
                if !swept.is_empty() {
                    info!(count = swept.len(), "timeout sweep canceled expired tasks");
                }
            }
        })
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
