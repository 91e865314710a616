//! Pipeline Configuration

use serde::{Deserialize, Serialize};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Feed endpoints registered at startup
    pub sources: Vec<String>,
    /// Entries taken from the head of each feed per sweep
    pub per_source_limit: usize,
    /// Articles handed to the reasoning service per cycle
    pub extraction_batch: usize,
    /// Timeout applied to every outbound HTTP call, in seconds
    pub http_timeout_secs: u64,
    /// Reasoning service settings
    pub reasoning: ReasoningConfig,
    /// Inter-stage pacing
    pub pacing: PacingConfig,
}

/// Reasoning service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Base URL of the chat-completions endpoint
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// API key; overridable via ISEC_REASONING_API_KEY
    pub api_key: String,
}

/// Delays between pipeline stages. Zero everything in tests to drive cycles
/// synchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause between collection and extraction within a cycle
    pub collect_to_extract_secs: u64,
    /// Pause between full cycles
    pub cycle_secs: u64,
    /// Shorter pause taken after a failed cycle before resuming
    pub recovery_secs: u64,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            sources: crate::sources::default_sources(),
            per_source_limit: crate::collector::PER_SOURCE_LIMIT,
            extraction_batch: crate::extraction::EXTRACTION_BATCH,
            http_timeout_secs: 30,
            reasoning: ReasoningConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: String::new(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            collect_to_extract_secs: 10,
            cycle_secs: 300,
            recovery_secs: 60,
        }
    }
}

impl IntelConfig {
    /// Load from file
    pub fn load(path: &str) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment wins over the file for secrets
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ISEC_REASONING_API_KEY") {
            self.reasoning.api_key = key;
        }
    }

    /// Shared HTTP client honoring the configured timeout
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .build()
    }
}

impl PacingConfig {
    /// Pacing with no delays, for tests and one-shot runs
    pub fn immediate() -> Self {
        Self {
            collect_to_extract_secs: 0,
            cycle_secs: 0,
            recovery_secs: 0,
        }
    }

    pub fn collect_to_extract(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.collect_to_extract_secs)
    }

    pub fn cycle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_secs)
    }

    pub fn recovery(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.recovery_secs)
    }
}
