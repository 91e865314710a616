//! Curated Threat-Hunt IOCs
//!
//! Hand-managed indicators for manual hunting, independent of the extracted
//! attack population. Only the admin collaborator writes here; the pipeline
//! never touches these records.

use crate::store::IntelStore;
use crate::{IocKind, ThreatHuntIoc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum HuntError {
    #[error("value does not look like a {0}: {1}")]
    KindMismatch(&'static str, String),
    #[error("empty indicator value")]
    EmptyValue,
    #[error("hunt IOC not found: {0}")]
    NotFound(String),
}

/// Curation surface over the hunt-IOC collection
pub struct HuntBook {
    store: Arc<IntelStore>,
}

impl HuntBook {
    pub fn new(store: Arc<IntelStore>) -> Self {
        Self { store }
    }

    /// Validate and store a curated indicator. The kind may be given by the
    /// operator or auto-detected from the value.
    pub fn add(
        &self,
        kind: Option<IocKind>,
        value: &str,
        description: &str,
        source: &str,
    ) -> Result<ThreatHuntIoc, HuntError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(HuntError::EmptyValue);
        }

        let detected = detect_kind(value);
        let kind = match (kind, detected) {
            (Some(k), Some(d)) if k != d => {
                return Err(HuntError::KindMismatch(k.as_str(), value.to_string()))
            }
            (Some(k), _) => k,
            (None, Some(d)) => d,
            (None, None) => return Err(HuntError::KindMismatch("known kind", value.to_string())),
        };

        let ioc = ThreatHuntIoc {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            value: value.to_string(),
            description: description.to_string(),
            source: source.to_string(),
            added_at: chrono::Utc::now(),
        };
        self.store.add_hunt_ioc(ioc.clone());
        info!(kind = kind.as_str(), value = %ioc.value, "hunt IOC added");
        Ok(ioc)
    }

    pub fn remove(&self, id: &str) -> Result<ThreatHuntIoc, HuntError> {
        self.store
            .remove_hunt_ioc(id)
            .ok_or_else(|| HuntError::NotFound(id.to_string()))
    }

    /// Newest first, optionally filtered by kind
    pub fn list(&self, kind: Option<IocKind>) -> Vec<ThreatHuntIoc> {
        self.store.hunt_iocs(kind)
    }
}

/// Best-effort kind detection from a raw indicator value
pub fn detect_kind(value: &str) -> Option<IocKind> {
    if value.parse::<std::net::IpAddr>().is_ok() {
        return Some(IocKind::Ip);
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(IocKind::Url);
    }

    if value.contains('@') && value.contains('.') {
        return Some(IocKind::Email);
    }

    // Hash detection by hex length (MD5 / SHA-1 / SHA-256)
    if value.chars().all(|c| c.is_ascii_hexdigit()) {
        if matches!(value.len(), 32 | 40 | 64) {
            return Some(IocKind::Hash);
        }
    }

    // Dotted name without path or whitespace reads as a domain
    if value.contains('.') && !value.contains('/') && !value.contains(' ') {
        return Some(IocKind::Domain);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> HuntBook {
        HuntBook::new(Arc::new(IntelStore::new()))
    }

    #[test]
    fn detects_common_kinds() {
        assert_eq!(detect_kind("192.168.10.5"), Some(IocKind::Ip));
        assert_eq!(detect_kind("2001:db8::1"), Some(IocKind::Ip));
        assert_eq!(detect_kind("https://evil.example/payload"), Some(IocKind::Url));
        assert_eq!(detect_kind("ops@evil.example"), Some(IocKind::Email));
        assert_eq!(detect_kind(&"a".repeat(64)), Some(IocKind::Hash));
        assert_eq!(detect_kind("evil.example"), Some(IocKind::Domain));
        assert_eq!(detect_kind("just words"), None);
    }

    #[test]
    fn add_autodetects_and_lists_by_kind() {
        let book = book();
        book.add(None, "10.0.0.66", "C2 address", "incident-42").unwrap();
        book.add(None, "evil.example", "C2 domain", "incident-42").unwrap();

        assert_eq!(book.list(None).len(), 2);
        let ips = book.list(Some(IocKind::Ip));
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].value, "10.0.0.66");
    }

    #[test]
    fn add_rejects_mismatched_kind() {
        let book = book();
        let result = book.add(Some(IocKind::Ip), "evil.example", "", "");
        assert!(matches!(result, Err(HuntError::KindMismatch(_, _))));
    }

    #[test]
    fn remove_round_trips() {
        let book = book();
        let ioc = book.add(None, "10.0.0.66", "", "").unwrap();
        assert!(book.remove(&ioc.id).is_ok());
        assert!(matches!(book.remove(&ioc.id), Err(HuntError::NotFound(_))));
    }
}
