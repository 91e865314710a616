//! Extraction Stage
//!
//! Feeds small batches of unprocessed articles through the reasoning service
//! and turns structured responses into attack profiles. Every article gets
//! exactly one service attempt, ever: the article is marked processed as the
//! terminal step whether extraction succeeded or failed, so a permanently
//! failing article can never wedge the pipeline in a retry loop.

use crate::analyst::{article_prompt, ReasoningBackend, SYSTEM_INSTRUCTION};
use crate::matching::MatchingEngine;
use crate::store::IntelStore;
use crate::{AttackProfile, RawArticle, Severity, TargetTags};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Articles pulled per extraction run
pub const EXTRACTION_BATCH: usize = 3;

/// Scan free text for the first balanced brace-delimited JSON object.
/// Tolerates surrounding prose and markdown fencing, and one level of
/// nested objects; candidates that do not parse are skipped.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let scanner = regex::Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").ok()?;

    for candidate in scanner.find_iter(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate.as_str()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

/// Build an attack profile from a parsed response, defaulting every missing
/// field. Targeting defaults are wide open (Global/All) so an under-specified
/// extraction still reaches subscribers.
pub fn attack_from_response(value: &serde_json::Value, article: &RawArticle) -> AttackProfile {
    AttackProfile {
        id: uuid::Uuid::new_v4().to_string(),
        name: value
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&article.title)
            .to_string(),
        description: string_field(value, "description").unwrap_or_default(),
        // older reasoning prompts emitted iocs/ttps; tolerate both spellings
        indicators: list_field(value, &["indicators", "iocs"]).unwrap_or_default(),
        techniques: list_field(value, &["techniques", "ttps"]).unwrap_or_default(),
        mitre_tactics: list_field(value, &["mitre_tactics"]).unwrap_or_default(),
        threat_actor: string_field(value, "threat_actor"),
        tags: TargetTags {
            industries: list_field(value, &["industries"])
                .unwrap_or_else(|| vec!["Global".to_string()]),
            regions: list_field(value, &["regions"]).unwrap_or_else(|| vec!["Global".to_string()]),
            sec_solutions: list_field(value, &["sec_solutions"])
                .unwrap_or_else(|| vec!["All".to_string()]),
        },
        source_url: article.source_url.clone(),
        severity: Severity::parse_lenient(value.get("severity").and_then(|v| v.as_str())),
        discovered_at: chrono::Utc::now(),
        mitigations: list_field(value, &["mitigations"]).unwrap_or_default(),
    }
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First present key wins; non-string elements are dropped
fn list_field(value: &serde_json::Value, keys: &[&str]) -> Option<Vec<String>> {
    for key in keys {
        if let Some(items) = value.get(*key).and_then(|v| v.as_array()) {
            return Some(
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(str::to_string)
                    .collect(),
            );
        }
    }
    None
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub articles_seen: usize,
    pub attacks_extracted: usize,
    pub failures: usize,
}

pub struct ExtractionStage {
    store: Arc<IntelStore>,
    backend: Arc<dyn ReasoningBackend>,
    matcher: Arc<MatchingEngine>,
    batch_size: usize,
}

impl ExtractionStage {
    pub fn new(
        store: Arc<IntelStore>,
        backend: Arc<dyn ReasoningBackend>,
        matcher: Arc<MatchingEngine>,
    ) -> Self {
        Self {
            store,
            backend,
            matcher,
            batch_size: EXTRACTION_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Process one batch of unprocessed articles. Each article is marked
    /// processed as the terminal step regardless of outcome, and one
    /// article's failure never stops the rest of the batch.
    pub async fn run_batch(&self) -> ExtractionReport {
        let batch = self.store.unprocessed_articles(self.batch_size);
        let mut report = ExtractionReport {
            articles_seen: batch.len(),
            ..Default::default()
        };

        for article in batch {
            if self.process_article(&article).await {
                report.attacks_extracted += 1;
            } else {
                report.failures += 1;
            }
            self.store.mark_processed(&article.source_url);
        }

        if report.articles_seen > 0 {
            info!(
                articles = report.articles_seen,
                attacks = report.attacks_extracted,
                failures = report.failures,
                "extraction batch complete"
            );
        }
        report
    }

    /// One attempt for one article. Returns whether an attack was extracted.
    async fn process_article(&self, article: &RawArticle) -> bool {
        let prompt = article_prompt(article);

        let response = match self.backend.complete(SYSTEM_INSTRUCTION, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                // accepted data loss: the article is dropped, not retried
                warn!(article = %article.source_url, error = %e, "reasoning service call failed");
                return false;
            }
        };

        let Some(value) = extract_json_object(&response) else {
            warn!(article = %article.source_url, "no JSON object found in reasoning response");
            return false;
        };

        let attack = attack_from_response(&value, article);
        if !self.store.insert_attack(attack.clone()) {
            debug!(article = %article.source_url, "attack already extracted for article");
            return false;
        }

        info!(
            attack = %attack.name,
            severity = %attack.severity,
            article = %article.source_url,
            "attack profile extracted"
        );

        self.matcher.match_attack_to_all_subscribers(&attack);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::{AnalystError, ScriptedBackend};
    use crate::rules::RuleSynthesizer;
    use crate::SubscriberProfile;

    fn article(url: &str) -> RawArticle {
        RawArticle {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Fallback Title".to_string(),
            source_url: url.to_string(),
            summary: "summary".to_string(),
            source: "https://feed.example/rss".to_string(),
            published_at: chrono::Utc::now(),
            processed: false,
        }
    }

    fn digest(url: &str) -> crate::ArticleDigest {
        crate::ArticleDigest {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Fallback Title".to_string(),
            summary: "summary".to_string(),
            url: url.to_string(),
            published_at: chrono::Utc::now(),
            source: "https://feed.example/rss".to_string(),
        }
    }

    fn stage_with(
        backend: Arc<ScriptedBackend>,
    ) -> (Arc<IntelStore>, ExtractionStage) {
        let store = Arc::new(IntelStore::new());
        let synthesizer = Arc::new(RuleSynthesizer::new(store.clone()));
        let matcher = Arc::new(MatchingEngine::new(store.clone(), synthesizer));
        let stage = ExtractionStage::new(store.clone(), backend, matcher);
        (store, stage)
    }

    // -------------------------------------------------------------------------
    // JSON scanning
    // -------------------------------------------------------------------------

    #[test]
    fn finds_plain_object() {
        let value = extract_json_object(r#"{"name": "X"}"#).unwrap();
        assert_eq!(value["name"], "X");
    }

    #[test]
    fn finds_object_in_prose_and_fences() {
        let text = "Sure! Here is the analysis:\n```json\n{\"name\": \"X\", \"severity\": \"High\"}\n```\nLet me know.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["severity"], "High");
    }

    #[test]
    fn tolerates_one_level_of_nesting() {
        let text = r#"prefix {"name": "X", "tags": {"industries": ["Finance"]}} suffix"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["tags"]["industries"][0], "Finance");
    }

    #[test]
    fn skips_non_json_brace_runs() {
        let text = r#"{not json at all} then {"name": "X"}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["name"], "X");
    }

    #[test]
    fn no_object_yields_none() {
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object(r#"truncated {"name": "X""#).is_none());
        assert!(extract_json_object("").is_none());
    }

    // -------------------------------------------------------------------------
    // Field defaulting
    // -------------------------------------------------------------------------

    #[test]
    fn missing_fields_get_wide_open_defaults() {
        let value = extract_json_object(r#"{"name": "Bare"}"#).unwrap();
        let attack = attack_from_response(&value, &article("https://x/a"));
        assert_eq!(attack.tags.industries, vec!["Global".to_string()]);
        assert_eq!(attack.tags.regions, vec!["Global".to_string()]);
        assert_eq!(attack.tags.sec_solutions, vec!["All".to_string()]);
        assert_eq!(attack.severity, Severity::Medium);
        assert!(attack.indicators.is_empty());
        assert!(attack.techniques.is_empty());
        assert!(attack.mitigations.is_empty());
        assert!(attack.threat_actor.is_none());
    }

    #[test]
    fn empty_name_falls_back_to_article_title() {
        let value = extract_json_object(r#"{"name": "  "}"#).unwrap();
        let attack = attack_from_response(&value, &article("https://x/a"));
        assert_eq!(attack.name, "Fallback Title");
    }

    #[test]
    fn legacy_ioc_and_ttp_keys_are_accepted() {
        let value =
            extract_json_object(r#"{"name": "X", "iocs": ["1.2.3.4"], "ttps": ["T1059"]}"#)
                .unwrap();
        let attack = attack_from_response(&value, &article("https://x/a"));
        assert_eq!(attack.indicators, vec!["1.2.3.4".to_string()]);
        assert_eq!(attack.techniques, vec!["T1059".to_string()]);
    }

    // -------------------------------------------------------------------------
    // Stage semantics
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn failed_service_call_still_marks_processed() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_err(AnalystError::Network("connection refused".to_string()));
        let (store, stage) = stage_with(backend.clone());
        store.insert_article(article("https://x/a1"), digest("https://x/a1"));

        let report = stage.run_batch().await;
        assert_eq!(report.articles_seen, 1);
        assert_eq!(report.failures, 1);
        assert!(store.unprocessed_articles(10).is_empty());

        // second batch must not re-submit the failed article
        let report = stage.run_batch().await;
        assert_eq!(report.articles_seen, 0);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn unparsable_response_still_marks_processed() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok("I could not find anything structured, sorry.");
        let (store, stage) = stage_with(backend.clone());
        store.insert_article(article("https://x/a1"), digest("https://x/a1"));

        let report = stage.run_batch().await;
        assert_eq!(report.failures, 1);
        assert!(store.unprocessed_articles(10).is_empty());
        assert_eq!(store.snapshot().attacks_total, 0);
    }

    #[tokio::test]
    async fn one_failure_never_stops_the_batch() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_err(AnalystError::Http(503));
        backend.push_ok(r#"{"name": "Second", "severity": "High"}"#);
        let (store, stage) = stage_with(backend);
        store.insert_article(article("https://x/a1"), digest("https://x/a1"));
        store.insert_article(article("https://x/a2"), digest("https://x/a2"));

        let report = stage.run_batch().await;
        assert_eq!(report.articles_seen, 2);
        assert_eq!(report.attacks_extracted, 1);
        assert_eq!(report.failures, 1);
        assert!(store.unprocessed_articles(10).is_empty());
    }

    #[tokio::test]
    async fn extracted_attack_is_matched_and_rules_synthesized() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(
            r#"Analysis follows: {"name":"X","severity":"Critical","industries":["Finance"],"regions":["Global"],"sec_solutions":["All"]} done."#,
        );
        let (store, stage) = stage_with(backend);
        store.insert_article(article("https://x/a1"), digest("https://x/a1"));
        store.upsert_profile(SubscriberProfile::new(
            "u-1",
            "Acme Bank",
            "Finance",
            "Asia",
            vec!["SIEM".to_string()],
        ));

        let report = stage.run_batch().await;
        assert_eq!(report.attacks_extracted, 1);

        let attacks = store.attacks_all();
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].severity, Severity::Critical);

        // Finance + Global region + All solutions scores 3: linked, two rules
        assert!(store.has_link("u-1", &attacks[0].id));
        assert_eq!(store.rules_for_attack(&attacks[0].id).len(), 2);
    }

    #[tokio::test]
    async fn batch_size_is_respected() {
        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_ok(r#"{"name": "X"}"#);
        }
        let (store, stage) = stage_with(backend.clone());
        for i in 0..5 {
            let url = format!("https://x/a{}", i);
            store.insert_article(article(&url), digest(&url));
        }

        let report = stage.run_batch().await;
        assert_eq!(report.articles_seen, EXTRACTION_BATCH);
        assert_eq!(backend.calls(), EXTRACTION_BATCH);
        assert_eq!(store.unprocessed_articles(10).len(), 2);
    }
}
