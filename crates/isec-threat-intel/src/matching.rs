//! Attack/Subscriber Matching Engine
//!
//! Scores one attack against one subscriber on tag overlap and links every
//! pair clearing the threshold. Two sweep entry points share the scorer and
//! differ only in the population iterated. Link inserts ride the store's
//! atomic keyed insert, so a concurrent sweep from the subscriber-creation
//! path cannot produce duplicates.

use crate::rules::RuleSynthesizer;
use crate::store::IntelStore;
use crate::{AttackLink, AttackProfile, SubscriberProfile, SubscriberTags, TargetTags, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Minimum tag-overlap score for a pair to be linked (out of 3)
pub const LINK_THRESHOLD: u8 = 2;

/// Tag-overlap score for one (attack, subscriber) pair.
///
/// One point each for: industry listed or attack targets Global industries;
/// region listed or Global regions; any subscriber solution listed or the
/// attack targets All solutions. The solution check is boolean, it stops at
/// the first hit.
pub fn score(attack: &TargetTags, subscriber: &SubscriberTags) -> u8 {
    let mut score = 0;

    if attack.industries_global() || attack.industries.contains(&subscriber.industry) {
        score += 1;
    }

    if attack.regions_global() || attack.regions.contains(&subscriber.region) {
        score += 1;
    }

    if attack.solutions_all()
        || subscriber
            .sec_solutions
            .iter()
            .any(|s| attack.sec_solutions.contains(s))
    {
        score += 1;
    }

    score
}

/// Outcome of one matching sweep
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub pairs_scored: usize,
    pub links_created: usize,
}

pub struct MatchingEngine {
    store: Arc<IntelStore>,
    synthesizer: Arc<RuleSynthesizer>,
}

impl MatchingEngine {
    pub fn new(store: Arc<IntelStore>, synthesizer: Arc<RuleSynthesizer>) -> Self {
        Self { store, synthesizer }
    }

    /// Sweep one new attack against every subscriber profile
    pub fn match_attack_to_all_subscribers(&self, attack: &AttackProfile) -> MatchReport {
        let mut report = MatchReport::default();

        for profile in self.store.profiles_all() {
            report.pairs_scored += 1;
            if self.link_pair(attack, &profile) {
                report.links_created += 1;
            }
        }

        info!(
            attack = %attack.name,
            pairs = report.pairs_scored,
            links = report.links_created,
            "attack matched against subscriber population"
        );
        report
    }

    /// Sweep one new subscriber against every known attack; invoked
    /// out-of-band when a profile is first created
    pub fn match_subscriber_to_all_attacks(&self, profile: &SubscriberProfile) -> MatchReport {
        let mut report = MatchReport::default();

        for attack in self.store.attacks_all() {
            report.pairs_scored += 1;
            if self.link_pair(&attack, profile) {
                report.links_created += 1;
            }
        }

        info!(
            user_id = %profile.user_id,
            pairs = report.pairs_scored,
            links = report.links_created,
            "subscriber matched against attack population"
        );
        report
    }

    /// Score one pair and link it when the threshold clears. Returns whether
    /// a new link was created. A failure for one pair is contained here.
    fn link_pair(&self, attack: &AttackProfile, profile: &SubscriberProfile) -> bool {
        let pair_score = score(&attack.tags, &profile.tags);
        if pair_score < LINK_THRESHOLD {
            return false;
        }

        // Existence check is an optimization; the keyed insert below is the
        // authoritative duplicate guard.
        if self.store.has_link(&profile.user_id, &attack.id) {
            return false;
        }

        let link = AttackLink {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: profile.user_id.clone(),
            attack_id: attack.id.clone(),
            name: attack.name.clone(),
            description: attack.description.clone(),
            severity: attack.severity,
            source_url: attack.source_url.clone(),
            discovered_at: attack.discovered_at,
            linked_at: chrono::Utc::now(),
        };

        if !self.store.insert_link(link) {
            return false;
        }

        debug!(
            user_id = %profile.user_id,
            attack = %attack.name,
            score = pair_score,
            "attack linked to subscriber"
        );

        self.synthesizer
            .ensure_rules(attack, &profile.tags.sec_solutions);
        true
    }
}

// =============================================================================
// Matching worker
// =============================================================================

/// Task submitted by the external profile-creation path
#[derive(Debug)]
pub enum MatchTask {
    /// Match a newly created subscriber against the existing attack
    /// population
    SubscriberCreated(UserId),
}

/// Spawn the single matching worker. Returns the submission handle; dropping
/// every sender stops the worker.
pub fn spawn_match_worker(
    engine: Arc<MatchingEngine>,
    store: Arc<IntelStore>,
) -> (mpsc::Sender<MatchTask>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<MatchTask>(64);

    let handle = tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            match task {
                MatchTask::SubscriberCreated(user_id) => match store.profile(&user_id) {
                    Some(profile) => {
                        engine.match_subscriber_to_all_attacks(&profile);
                    }
                    None => warn!(user_id = %user_id, "match task for unknown subscriber"),
                },
            }
        }
        debug!("matching worker stopped");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttackProfile, Severity};

    fn attack(industries: &[&str], regions: &[&str], solutions: &[&str]) -> AttackProfile {
        AttackProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Campaign".to_string(),
            description: "desc".to_string(),
            indicators: vec!["1.2.3.4".to_string()],
            techniques: vec!["T1566".to_string()],
            mitre_tactics: vec![],
            threat_actor: None,
            tags: TargetTags {
                industries: industries.iter().map(|s| s.to_string()).collect(),
                regions: regions.iter().map(|s| s.to_string()).collect(),
                sec_solutions: solutions.iter().map(|s| s.to_string()).collect(),
            },
            source_url: format!("https://x/{}", uuid::Uuid::new_v4()),
            severity: Severity::High,
            discovered_at: chrono::Utc::now(),
            mitigations: vec![],
        }
    }

    fn subscriber(user: &str, industry: &str, region: &str, solutions: &[&str]) -> SubscriberProfile {
        SubscriberProfile::new(
            user,
            "Acme",
            industry,
            region,
            solutions.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn engine_with_store() -> (Arc<IntelStore>, MatchingEngine) {
        let store = Arc::new(IntelStore::new());
        let synthesizer = Arc::new(RuleSynthesizer::new(store.clone()));
        (store.clone(), MatchingEngine::new(store, synthesizer))
    }

    #[test]
    fn score_counts_each_dimension_once() {
        let sub = subscriber("u", "Finance", "Europe", &["SIEM"]).tags;

        // industry only
        let a = attack(&["Finance"], &["Asia"], &["EDR"]);
        assert_eq!(score(&a.tags, &sub), 1);

        // industry + solution via All
        let a = attack(&["Finance"], &["Asia"], &["All"]);
        assert_eq!(score(&a.tags, &sub), 2);

        // all three via Global/All
        let a = attack(&["Global"], &["Global"], &["All"]);
        assert_eq!(score(&a.tags, &sub), 3);

        // solution check is boolean even with several overlapping solutions
        let sub2 = subscriber("u2", "Retail", "Africa", &["SIEM", "EDR"]).tags;
        let a = attack(&["Finance"], &["Asia"], &["SIEM", "EDR"]);
        assert_eq!(score(&a.tags, &sub2), 1);
    }

    #[test]
    fn threshold_is_two_of_three() {
        let (store, engine) = engine_with_store();
        store.upsert_profile(subscriber("u-1", "Finance", "Europe", &["SIEM"]));

        // score 1: no link
        let weak = attack(&["Finance"], &["Asia"], &["EDR"]);
        let report = engine.match_attack_to_all_subscribers(&weak);
        assert_eq!(report.links_created, 0);

        // score 2: linked
        let strong = attack(&["Finance"], &["Asia"], &["All"]);
        let report = engine.match_attack_to_all_subscribers(&strong);
        assert_eq!(report.links_created, 1);
        assert!(store.has_link("u-1", &strong.id));
    }

    #[test]
    fn matching_is_idempotent() {
        let (store, engine) = engine_with_store();
        store.upsert_profile(subscriber("u-1", "Finance", "Asia", &["SIEM"]));
        let a = attack(&["Finance"], &["Global"], &["All"]);

        let first = engine.match_attack_to_all_subscribers(&a);
        let second = engine.match_attack_to_all_subscribers(&a);
        assert_eq!(first.links_created, 1);
        assert_eq!(second.links_created, 0);
        assert_eq!(store.snapshot().links_total, 1);
    }

    #[test]
    fn subscriber_sweep_mirrors_attack_sweep() {
        let (store, engine) = engine_with_store();
        let a = attack(&["Finance"], &["Global"], &["All"]);
        store.insert_attack(a.clone());

        let profile = subscriber("u-9", "Finance", "Asia", &["SIEM"]);
        store.upsert_profile(profile.clone());

        let report = engine.match_subscriber_to_all_attacks(&profile);
        assert_eq!(report.links_created, 1);
        assert!(store.has_link("u-9", &a.id));
    }

    #[tokio::test]
    async fn worker_processes_subscriber_tasks() {
        let store = Arc::new(IntelStore::new());
        let synthesizer = Arc::new(RuleSynthesizer::new(store.clone()));
        let engine = Arc::new(MatchingEngine::new(store.clone(), synthesizer));

        let a = attack(&["Global"], &["Global"], &["All"]);
        store.insert_attack(a.clone());
        let profile = subscriber("u-w", "Energy", "Asia", &["Firewall"]);
        store.upsert_profile(profile);

        let (tx, handle) = spawn_match_worker(engine, store.clone());
        tx.send(MatchTask::SubscriberCreated("u-w".to_string()))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(store.has_link("u-w", &a.id));
    }
}
