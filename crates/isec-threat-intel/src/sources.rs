//! Feed Source Registry
//!
//! Process-lifetime list of syndication endpoints consumed by the collector.
//! Explicitly owned and injected, never ambient. Insertion order is kept so
//! the collector's per-source entry sampling stays deterministic.

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source already registered: {0}")]
    AlreadyRegistered(String),
    #[error("source not registered: {0}")]
    NotRegistered(String),
}

/// Mutable, order-preserving set of feed endpoints
pub struct SourceRegistry {
    sources: RwLock<Vec<String>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Registry preloaded with the stock threat-news endpoints
    pub fn with_defaults() -> Self {
        Self::new(default_sources())
    }

    pub fn add(&self, url: &str) -> Result<(), SourceError> {
        let mut sources = self.sources.write();
        if sources.iter().any(|s| s == url) {
            return Err(SourceError::AlreadyRegistered(url.to_string()));
        }
        sources.push(url.to_string());
        Ok(())
    }

    pub fn remove(&self, url: &str) -> Result<(), SourceError> {
        let mut sources = self.sources.write();
        match sources.iter().position(|s| s == url) {
            Some(idx) => {
                sources.remove(idx);
                Ok(())
            }
            None => Err(SourceError::NotRegistered(url.to_string())),
        }
    }

    /// Snapshot of the registered endpoints in insertion order
    pub fn list(&self) -> Vec<String> {
        self.sources.read().clone()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

/// Stock threat-news feeds polled out of the box
pub fn default_sources() -> Vec<String> {
    vec![
        "https://www.cisa.gov/news-events/cybersecurity-advisories".to_string(),
        "https://feeds.feedburner.com/TheHackersNews".to_string(),
        "https://www.bleepingcomputer.com/feed/".to_string(),
        "https://www.darkreading.com/rss.xml".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicates() {
        let registry = SourceRegistry::new(vec![]);
        assert!(registry.add("https://a.example/rss").is_ok());
        assert_eq!(
            registry.add("https://a.example/rss"),
            Err(SourceError::AlreadyRegistered(
                "https://a.example/rss".to_string()
            ))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_rejects_absent() {
        let registry = SourceRegistry::new(vec!["https://a.example/rss".to_string()]);
        assert!(registry.remove("https://a.example/rss").is_ok());
        assert_eq!(
            registry.remove("https://a.example/rss"),
            Err(SourceError::NotRegistered(
                "https://a.example/rss".to_string()
            ))
        );
    }

    #[test]
    fn iteration_order_is_insertion_order() {
        let registry = SourceRegistry::new(vec![]);
        registry.add("https://b.example/rss").unwrap();
        registry.add("https://a.example/rss").unwrap();
        registry.add("https://c.example/rss").unwrap();
        assert_eq!(
            registry.list(),
            vec![
                "https://b.example/rss".to_string(),
                "https://a.example/rss".to_string(),
                "https://c.example/rss".to_string(),
            ]
        );
    }

    #[test]
    fn defaults_are_populated() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(registry.len(), 4);
    }
}
