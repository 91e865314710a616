//! Collaborator API Facade
//!
//! In-process surface consumed by the external web tier: the profile store
//! (subscriber writes plus the out-of-band match trigger), dashboard reads,
//! and the admin operations. The pipeline itself never calls in here.

use crate::hunting::{HuntBook, HuntError};
use crate::matching::MatchTask;
use crate::rules::{RuleError, RuleSynthesizer};
use crate::sources::{SourceError, SourceRegistry};
use crate::store::{IntelStore, StoreSnapshot};
use crate::{
    ArticleDigest, AttackLink, DetectionRule, IocKind, RuleDialect, Severity, SubscriberProfile,
    ThreatHuntIoc,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Attack links shown per dashboard page
const ATTACKS_PAGE_SIZE: usize = 20;

/// Insights shown on the dashboard
const INSIGHTS_PAGE_SIZE: usize = 15;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown subscriber: {0}")]
    UnknownSubscriber(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Hunt(#[from] HuntError),
}

/// Rules for one attack, split by dialect
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub yara: Vec<DetectionRule>,
    pub sigma: Vec<DetectionRule>,
}

/// Headline numbers for one subscriber's dashboard
#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub total_threats: usize,
    pub critical_threats: usize,
    pub high_threats: usize,
    pub medium_threats: usize,
    pub industry: String,
    pub region: String,
}

pub struct IntelApi {
    store: Arc<IntelStore>,
    registry: Arc<SourceRegistry>,
    synthesizer: Arc<RuleSynthesizer>,
    hunt: HuntBook,
    match_tx: mpsc::Sender<MatchTask>,
}

impl IntelApi {
    pub fn new(
        store: Arc<IntelStore>,
        registry: Arc<SourceRegistry>,
        synthesizer: Arc<RuleSynthesizer>,
        match_tx: mpsc::Sender<MatchTask>,
    ) -> Self {
        let hunt = HuntBook::new(store.clone());
        Self {
            store,
            registry,
            synthesizer,
            hunt,
            match_tx,
        }
    }

    // =========================================================================
    // Profile store
    // =========================================================================

    /// Store a newly created subscriber and queue the out-of-band sweep
    /// against the existing attack population. The sweep is fire-and-forget;
    /// if the queue is unavailable the subscriber still matches against
    /// every future attack.
    pub fn register_subscriber(&self, profile: SubscriberProfile) {
        let user_id = profile.user_id.clone();
        self.store.upsert_profile(profile);

        if let Err(e) = self
            .match_tx
            .try_send(MatchTask::SubscriberCreated(user_id.clone()))
        {
            warn!(user_id = %user_id, error = %e, "could not queue subscriber match sweep");
        } else {
            info!(user_id = %user_id, "subscriber registered, match sweep queued");
        }
    }

    /// Edit a subscriber's risk context; the derived tag bundle is
    /// recomputed as part of the update.
    pub fn update_subscriber_context(
        &self,
        user_id: &str,
        industry: &str,
        region: &str,
        security_solutions: Vec<String>,
    ) -> Result<SubscriberProfile, ApiError> {
        let mut profile = self
            .store
            .profile(user_id)
            .ok_or_else(|| ApiError::UnknownSubscriber(user_id.to_string()))?;
        profile.update_context(industry, region, security_solutions);
        self.store.upsert_profile(profile.clone());
        Ok(profile)
    }

    pub fn subscriber(&self, user_id: &str) -> Option<SubscriberProfile> {
        self.store.profile(user_id)
    }

    pub fn subscribers(&self) -> Vec<SubscriberProfile> {
        self.store.profiles_all()
    }

    // =========================================================================
    // Dashboard reads
    // =========================================================================

    pub fn dashboard_stats(&self, user_id: &str) -> Result<DashboardStats, ApiError> {
        let profile = self
            .store
            .profile(user_id)
            .ok_or_else(|| ApiError::UnknownSubscriber(user_id.to_string()))?;

        let links = self.store.links_for_user(user_id);
        let by_severity = |severity: Severity| links.iter().filter(|l| l.severity == severity).count();

        Ok(DashboardStats {
            total_threats: links.len(),
            critical_threats: by_severity(Severity::Critical),
            high_threats: by_severity(Severity::High),
            medium_threats: by_severity(Severity::Medium),
            industry: profile.industry,
            region: profile.region,
        })
    }

    /// Matched attacks for one subscriber, newest discovery first
    pub fn subscriber_attacks(&self, user_id: &str) -> Vec<AttackLink> {
        let mut links = self.store.links_for_user(user_id);
        links.truncate(ATTACKS_PAGE_SIZE);
        links
    }

    pub fn attack_rules(&self, attack_id: &str) -> RuleSet {
        let mut set = RuleSet::default();
        for rule in self.store.rules_for_attack(attack_id) {
            match rule.dialect {
                RuleDialect::Yara => set.yara.push(rule),
                RuleDialect::Sigma => set.sigma.push(rule),
            }
        }
        set
    }

    /// Latest article digests for the insights view
    pub fn insights(&self) -> Vec<ArticleDigest> {
        self.store.recent_digests(INSIGHTS_PAGE_SIZE)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    // =========================================================================
    // Admin operations
    // =========================================================================

    pub fn add_source(&self, url: &str) -> Result<Vec<String>, ApiError> {
        self.registry.add(url)?;
        Ok(self.registry.list())
    }

    pub fn remove_source(&self, url: &str) -> Result<Vec<String>, ApiError> {
        self.registry.remove(url)?;
        Ok(self.registry.list())
    }

    pub fn list_sources(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Rebuild both rule dialects for an attack with operator-supplied
    /// indicators/techniques, replacing existing content unconditionally.
    pub fn regenerate_rules(
        &self,
        attack_id: &str,
        extra_indicators: &[String],
        extra_techniques: &[String],
    ) -> Result<Vec<DetectionRule>, ApiError> {
        Ok(self
            .synthesizer
            .regenerate(attack_id, extra_indicators, extra_techniques)?)
    }

    pub fn add_hunt_ioc(
        &self,
        kind: Option<IocKind>,
        value: &str,
        description: &str,
        source: &str,
    ) -> Result<ThreatHuntIoc, ApiError> {
        Ok(self.hunt.add(kind, value, description, source)?)
    }

    pub fn remove_hunt_ioc(&self, id: &str) -> Result<ThreatHuntIoc, ApiError> {
        Ok(self.hunt.remove(id)?)
    }

    pub fn list_hunt_iocs(&self, kind: Option<IocKind>) -> Vec<ThreatHuntIoc> {
        self.hunt.list(kind)
    }
}
