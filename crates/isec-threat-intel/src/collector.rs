//! Feed Collector
//!
//! Polls every registered source, parses the syndication document and
//! persists unseen entries as raw articles plus an insights digest. A failing
//! source never aborts the sweep over the remaining sources.

use crate::sources::SourceRegistry;
use crate::store::IntelStore;
use crate::syndication;
use crate::{ArticleDigest, RawArticle};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Entries taken from the head of each feed per sweep
pub const PER_SOURCE_LIMIT: usize = 5;

/// Storage cap for the raw article summary
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Storage cap for the insights digest summary
pub const DIGEST_MAX_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    Http(u16),
    #[error(transparent)]
    Parse(#[from] syndication::FeedParseError),
}

/// Outcome of one full sweep over the registry
#[derive(Debug, Clone, Default)]
pub struct CollectorReport {
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub articles_new: usize,
}

pub struct FeedCollector {
    registry: Arc<SourceRegistry>,
    store: Arc<IntelStore>,
    client: reqwest::Client,
    per_source_limit: usize,
}

impl FeedCollector {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<IntelStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            store,
            client,
            per_source_limit: PER_SOURCE_LIMIT,
        }
    }

    pub fn with_per_source_limit(mut self, limit: usize) -> Self {
        self.per_source_limit = limit;
        self
    }

    /// Sweep every registered source. Always completes; per-source failures
    /// are logged and counted, never propagated.
    pub async fn sweep(&self) -> CollectorReport {
        let mut report = CollectorReport::default();

        for source in self.registry.list() {
            report.sources_polled += 1;
            match self.collect_source(&source).await {
                Ok(new) => {
                    debug!(source = %source, new_articles = new, "source collected");
                    report.articles_new += new;
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "source collection failed");
                    report.sources_failed += 1;
                }
            }
        }

        info!(
            sources = report.sources_polled,
            failed = report.sources_failed,
            new_articles = report.articles_new,
            "feed sweep complete"
        );
        report
    }

    async fn collect_source(&self, source: &str) -> Result<usize, CollectError> {
        let response = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| CollectError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollectError::Http(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CollectError::Network(e.to_string()))?;

        let entries = syndication::parse_feed(&body)?;

        let mut new = 0;
        for entry in entries.into_iter().take(self.per_source_limit) {
            if self.store.has_article(&entry.link) {
                continue;
            }

            let published_at = entry.published.unwrap_or_else(chrono::Utc::now);
            let article = RawArticle {
                id: uuid::Uuid::new_v4().to_string(),
                title: entry.title.clone(),
                source_url: entry.link.clone(),
                summary: truncate_chars(&entry.summary, SUMMARY_MAX_CHARS),
                source: source.to_string(),
                published_at,
                processed: false,
            };
            let digest = ArticleDigest {
                id: uuid::Uuid::new_v4().to_string(),
                title: entry.title,
                summary: truncate_chars(&entry.summary, DIGEST_MAX_CHARS),
                url: entry.link,
                published_at,
                source: source.to_string(),
            };

            if self.store.insert_article(article, digest) {
                new += 1;
            }
        }

        Ok(new)
    }
}

/// Character-boundary-safe truncation
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unreachable_source_does_not_abort_sweep() {
        let registry = Arc::new(SourceRegistry::new(vec![
            "http://127.0.0.1:9/feed".to_string(),
            "http://127.0.0.1:9/other".to_string(),
        ]));
        let store = Arc::new(IntelStore::new());
        let collector = FeedCollector::new(registry, store.clone(), test_client());

        let report = collector.sweep().await;
        assert_eq!(report.sources_polled, 2);
        assert_eq!(report.sources_failed, 2);
        assert_eq!(report.articles_new, 0);
        assert_eq!(store.snapshot().articles_total, 0);
    }

    #[tokio::test]
    async fn empty_registry_sweeps_cleanly() {
        let registry = Arc::new(SourceRegistry::new(vec![]));
        let store = Arc::new(IntelStore::new());
        let collector = FeedCollector::new(registry, store, test_client());

        let report = collector.sweep().await;
        assert_eq!(report.sources_polled, 0);
        assert_eq!(report.sources_failed, 0);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "αβγδε".repeat(200);
        let cut = truncate_chars(&s, SUMMARY_MAX_CHARS);
        assert_eq!(cut.chars().count(), SUMMARY_MAX_CHARS);
    }
}
