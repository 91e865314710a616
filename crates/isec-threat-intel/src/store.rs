//! Intel Store
//!
//! Concurrent in-memory record store. Every collection is keyed by the
//! record's uniqueness key, so duplicate suppression is enforced by the map
//! itself: inserts go through `entry()`, which is atomic per key. Callers'
//! existence checks are an optimization on top, not the guard.

use crate::{
    ArticleDigest, AttackId, AttackLink, AttackProfile, DetectionRule, IocKind, RawArticle,
    RuleDialect, SubscriberProfile, ThreatHuntIoc, UserId,
};
use dashmap::mapref::entry::Entry;

/// Concurrent store for all pipeline-owned and collaborator-visible records
#[derive(Default)]
pub struct IntelStore {
    /// Raw articles keyed by source URL (the dedup key)
    articles: dashmap::DashMap<String, RawArticle>,
    /// Insights projection keyed by article URL
    digests: dashmap::DashMap<String, ArticleDigest>,
    /// Attack profiles by id
    attacks: dashmap::DashMap<AttackId, AttackProfile>,
    /// Source URL -> attack id; enforces at most one attack per article
    attack_by_article: dashmap::DashMap<String, AttackId>,
    /// Subscriber profiles by user id (owned by the profile collaborator)
    profiles: dashmap::DashMap<UserId, SubscriberProfile>,
    /// Attack links keyed by (user_id, attack_id)
    links: dashmap::DashMap<(UserId, AttackId), AttackLink>,
    /// Detection rules keyed by (attack_id, dialect)
    rules: dashmap::DashMap<(AttackId, RuleDialect), DetectionRule>,
    /// Curated hunt IOCs by id
    hunt_iocs: dashmap::DashMap<String, ThreatHuntIoc>,
}

impl IntelStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Raw articles & digests
    // =========================================================================

    pub fn has_article(&self, source_url: &str) -> bool {
        self.articles.contains_key(source_url)
    }

    /// Insert a new article plus its insights digest. Returns false without
    /// touching anything when the URL was seen before.
    pub fn insert_article(&self, article: RawArticle, digest: ArticleDigest) -> bool {
        match self.articles.entry(article.source_url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.digests.insert(digest.url.clone(), digest);
                slot.insert(article);
                true
            }
        }
    }

    /// Up to `limit` articles still awaiting extraction
    pub fn unprocessed_articles(&self, limit: usize) -> Vec<RawArticle> {
        self.articles
            .iter()
            .filter(|entry| !entry.processed)
            .take(limit)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Flip `processed` to true. The flag never reverts; marking an already
    /// processed article is a no-op. Returns whether a transition happened.
    pub fn mark_processed(&self, source_url: &str) -> bool {
        match self.articles.get_mut(source_url) {
            Some(mut article) if !article.processed => {
                article.processed = true;
                true
            }
            _ => false,
        }
    }

    pub fn recent_digests(&self, limit: usize) -> Vec<ArticleDigest> {
        let mut digests: Vec<ArticleDigest> =
            self.digests.iter().map(|entry| entry.clone()).collect();
        digests.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        digests.truncate(limit);
        digests
    }

    // =========================================================================
    // Attack profiles
    // =========================================================================

    /// Insert an attack, enforcing at most one per source article. Returns
    /// false when an attack for that article already exists.
    pub fn insert_attack(&self, attack: AttackProfile) -> bool {
        match self.attack_by_article.entry(attack.source_url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(attack.id.clone());
                self.attacks.insert(attack.id.clone(), attack);
                true
            }
        }
    }

    pub fn attack(&self, id: &str) -> Option<AttackProfile> {
        self.attacks.get(id).map(|entry| entry.clone())
    }

    pub fn attacks_all(&self) -> Vec<AttackProfile> {
        self.attacks.iter().map(|entry| entry.clone()).collect()
    }

    // =========================================================================
    // Subscriber profiles
    // =========================================================================

    pub fn upsert_profile(&self, profile: SubscriberProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    pub fn profile(&self, user_id: &str) -> Option<SubscriberProfile> {
        self.profiles.get(user_id).map(|entry| entry.clone())
    }

    pub fn profiles_all(&self) -> Vec<SubscriberProfile> {
        self.profiles.iter().map(|entry| entry.clone()).collect()
    }

    // =========================================================================
    // Attack links
    // =========================================================================

    pub fn has_link(&self, user_id: &str, attack_id: &str) -> bool {
        self.links
            .contains_key(&(user_id.to_string(), attack_id.to_string()))
    }

    /// Insert a link unless the (user, attack) pair is already linked.
    /// Atomic per key, so concurrent sweeps cannot double-link a pair.
    pub fn insert_link(&self, link: AttackLink) -> bool {
        let key = (link.user_id.clone(), link.attack_id.clone());
        match self.links.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(link);
                true
            }
        }
    }

    /// Links for one subscriber, newest discovery first
    pub fn links_for_user(&self, user_id: &str) -> Vec<AttackLink> {
        let mut links: Vec<AttackLink> = self
            .links
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect();
        links.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
        links
    }

    // =========================================================================
    // Detection rules
    // =========================================================================

    pub fn has_rule(&self, attack_id: &str, dialect: RuleDialect) -> bool {
        self.rules.contains_key(&(attack_id.to_string(), dialect))
    }

    /// Skip-if-exists insert used by the automatic pipeline
    pub fn insert_rule_if_absent(&self, rule: DetectionRule) -> bool {
        let key = (rule.attack_id.clone(), rule.dialect);
        match self.rules.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(rule);
                true
            }
        }
    }

    /// Unconditional overwrite used by the explicit admin regeneration path
    pub fn replace_rule(&self, rule: DetectionRule) {
        self.rules
            .insert((rule.attack_id.clone(), rule.dialect), rule);
    }

    pub fn rules_for_attack(&self, attack_id: &str) -> Vec<DetectionRule> {
        self.rules
            .iter()
            .filter(|entry| entry.attack_id == attack_id)
            .map(|entry| entry.clone())
            .collect()
    }

    // =========================================================================
    // Curated hunt IOCs
    // =========================================================================

    pub fn add_hunt_ioc(&self, ioc: ThreatHuntIoc) {
        self.hunt_iocs.insert(ioc.id.clone(), ioc);
    }

    pub fn remove_hunt_ioc(&self, id: &str) -> Option<ThreatHuntIoc> {
        self.hunt_iocs.remove(id).map(|(_, ioc)| ioc)
    }

    pub fn hunt_iocs(&self, kind: Option<IocKind>) -> Vec<ThreatHuntIoc> {
        let mut iocs: Vec<ThreatHuntIoc> = self
            .hunt_iocs
            .iter()
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .map(|entry| entry.clone())
            .collect();
        iocs.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        iocs
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            articles_total: self.articles.len(),
            articles_unprocessed: self
                .articles
                .iter()
                .filter(|entry| !entry.processed)
                .count(),
            attacks_total: self.attacks.len(),
            profiles_total: self.profiles.len(),
            links_total: self.links.len(),
            rules_total: self.rules.len(),
            hunt_iocs_total: self.hunt_iocs.len(),
        }
    }
}

/// Point-in-time store counters
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub articles_total: usize,
    pub articles_unprocessed: usize,
    pub attacks_total: usize,
    pub profiles_total: usize,
    pub links_total: usize,
    pub rules_total: usize,
    pub hunt_iocs_total: usize,
}
