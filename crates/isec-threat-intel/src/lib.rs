//! IntelliSecure Threat Intelligence Pipeline
//!
//! Ingests public threat-news feeds, extracts structured attack profiles
//! through an external reasoning service, matches attacks against subscriber
//! risk profiles, and synthesizes detection rules for every match.
//!
//! # Features
//! - Multi-source RSS/Atom collection with exact-URL dedup
//! - At-most-once reasoning-service extraction per article
//! - Tag-overlap matching (industry / region / security solutions)
//! - YARA and Sigma rule synthesis per matched attack
//!
//! # Architecture
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     INTELLISECURE PIPELINE                      │
//! ├────────────────────────────────────────────────────────────────┤
//! │  Source Registry ──▶ Feed Collector ──▶ Raw Articles            │
//! │                                            │                    │
//! │                                            ▼                    │
//! │                          Extraction Stage (reasoning service)   │
//! │                                            │                    │
//! │                                            ▼                    │
//! │   Subscriber Profiles ──▶ Matching Engine ◀── Attack Profiles   │
//! │                                │                                │
//! │                                ▼                                │
//! │                     Attack Links ──▶ Rule Synthesizer           │
//! │                                        (YARA + Sigma)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

pub mod analyst;
pub mod api;
pub mod collector;
pub mod config;
pub mod extraction;
pub mod hunting;
pub mod matching;
pub mod orchestrator;
pub mod rules;
pub mod sources;
pub mod store;
pub mod syndication;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for an attack profile
pub type AttackId = String;

/// Unique identifier for a subscriber
pub type UserId = String;

// =============================================================================
// Severity
// =============================================================================

/// Attack severity, ordered least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lenient parse: extraction output is untrusted, anything unrecognized
    /// collapses to the default.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("low") => Severity::Low,
            Some(s) if s.eq_ignore_ascii_case("medium") => Severity::Medium,
            Some(s) if s.eq_ignore_ascii_case("high") => Severity::High,
            Some(s) if s.eq_ignore_ascii_case("critical") => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// Sigma `level` field value
    pub fn sigma_level(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Raw Articles & Insights
// =============================================================================

/// One fetched feed entry, pending or past extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: String,
    pub title: String,
    /// Unique across all stored articles; the dedup key
    pub source_url: String,
    pub summary: String,
    /// The feed endpoint the entry came from
    pub source: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub processed: bool,
}

/// Trimmed article projection served to the dashboard "insights" view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDigest {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

// =============================================================================
// Attack Profiles
// =============================================================================

/// Targeting tags extracted for an attack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetTags {
    pub industries: Vec<String>,
    pub regions: Vec<String>,
    pub sec_solutions: Vec<String>,
}

impl TargetTags {
    /// "Global" in the industries list means every industry is in scope
    pub fn industries_global(&self) -> bool {
        self.industries.iter().any(|i| i == "Global")
    }

    pub fn regions_global(&self) -> bool {
        self.regions.iter().any(|r| r == "Global")
    }

    /// "All" in the solutions list means every security solution is in scope
    pub fn solutions_all(&self) -> bool {
        self.sec_solutions.iter().any(|s| s == "All")
    }
}

/// Structured record for one extracted threat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackProfile {
    pub id: AttackId,
    pub name: String,
    pub description: String,
    /// Indicators of compromise, extraction order preserved
    pub indicators: Vec<String>,
    /// Tactics, techniques and procedures, extraction order preserved
    pub techniques: Vec<String>,
    pub mitre_tactics: Vec<String>,
    pub threat_actor: Option<String>,
    pub tags: TargetTags,
    pub source_url: String,
    pub severity: Severity,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
    pub mitigations: Vec<String>,
}

// =============================================================================
// Subscriber Profiles
// =============================================================================

/// Derived tag bundle used for matching; a pure function of the profile's
/// industry, region and security solutions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberTags {
    pub industry: String,
    pub region: String,
    pub sec_solutions: Vec<String>,
}

impl SubscriberTags {
    pub fn derive(industry: &str, region: &str, solutions: &[String]) -> Self {
        Self {
            industry: industry.to_string(),
            region: region.to_string(),
            sec_solutions: solutions.to_vec(),
        }
    }
}

/// A consumer's declared risk context, owned by the external profile store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub user_id: UserId,
    pub company_name: String,
    pub industry: String,
    pub region: String,
    pub security_solutions: Vec<String>,
    pub tags: SubscriberTags,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl SubscriberProfile {
    pub fn new(
        user_id: impl Into<UserId>,
        company_name: impl Into<String>,
        industry: impl Into<String>,
        region: impl Into<String>,
        security_solutions: Vec<String>,
    ) -> Self {
        let industry = industry.into();
        let region = region.into();
        let tags = SubscriberTags::derive(&industry, &region, &security_solutions);
        Self {
            user_id: user_id.into(),
            company_name: company_name.into(),
            industry,
            region,
            security_solutions,
            tags,
            created_at: chrono::Utc::now(),
        }
    }

    /// Replace the risk context and recompute the derived tag bundle.
    /// The bundle must never drift from the three source fields.
    pub fn update_context(
        &mut self,
        industry: impl Into<String>,
        region: impl Into<String>,
        security_solutions: Vec<String>,
    ) {
        self.industry = industry.into();
        self.region = region.into();
        self.security_solutions = security_solutions;
        self.tags =
            SubscriberTags::derive(&self.industry, &self.region, &self.security_solutions);
    }
}

// =============================================================================
// Attack Links
// =============================================================================

/// Association between one attack and one subscriber, created only by the
/// matching engine, never mutated afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackLink {
    pub id: String,
    pub user_id: UserId,
    pub attack_id: AttackId,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub source_url: String,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
    pub linked_at: chrono::DateTime<chrono::Utc>,
}

// =============================================================================
// Detection Rules
// =============================================================================

/// Output dialect of a synthesized detection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleDialect {
    Yara,
    Sigma,
}

impl RuleDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleDialect::Yara => "yara",
            RuleDialect::Sigma => "sigma",
        }
    }
}

/// A synthesized detection-rule artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: String,
    pub attack_id: AttackId,
    pub dialect: RuleDialect,
    pub rule_name: String,
    pub content: String,
}

// =============================================================================
// Curated Hunt IOCs
// =============================================================================

/// Indicator kind for curated threat-hunt entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocKind {
    Ip,
    Domain,
    Hash,
    Url,
    Email,
}

impl IocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IocKind::Ip => "ip",
            IocKind::Domain => "domain",
            IocKind::Hash => "hash",
            IocKind::Url => "url",
            IocKind::Email => "email",
        }
    }
}

/// A curated indicator for manual hunting, independent of any attack profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatHuntIoc {
    pub id: String,
    pub kind: IocKind,
    pub value: String,
    pub description: String,
    pub source: String,
    pub added_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse_lenient(Some("Critical")), Severity::Critical);
        assert_eq!(Severity::parse_lenient(Some("high")), Severity::High);
        assert_eq!(Severity::parse_lenient(Some(" LOW ")), Severity::Low);
        assert_eq!(Severity::parse_lenient(Some("catastrophic")), Severity::Medium);
        assert_eq!(Severity::parse_lenient(None), Severity::Medium);
    }

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn subscriber_tags_recomputed_on_update() {
        let mut profile = SubscriberProfile::new(
            "u-1",
            "Acme Corp",
            "Finance",
            "Europe",
            vec!["SIEM".to_string()],
        );
        assert_eq!(profile.tags.industry, "Finance");

        profile.update_context("Healthcare", "Asia", vec!["EDR".to_string()]);
        assert_eq!(profile.tags.industry, "Healthcare");
        assert_eq!(profile.tags.region, "Asia");
        assert_eq!(profile.tags.sec_solutions, vec!["EDR".to_string()]);
    }

    #[test]
    fn global_and_all_markers() {
        let tags = TargetTags {
            industries: vec!["Global".to_string()],
            regions: vec!["Asia".to_string()],
            sec_solutions: vec!["All".to_string()],
        };
        assert!(tags.industries_global());
        assert!(!tags.regions_global());
        assert!(tags.solutions_all());
    }
}
