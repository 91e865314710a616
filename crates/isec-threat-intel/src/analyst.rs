//! Reasoning Service Client
//!
//! Boundary to the external text-completion service that turns article prose
//! into structured attack data. The transport sits behind a trait so the
//! extraction stage can run against a scripted backend in tests.

use crate::RawArticle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed instruction describing the structured output expected per article
pub const SYSTEM_INSTRUCTION: &str = "\
You are a cybersecurity threat intelligence analyst. Analyze the given threat \
article and extract:
1. Attack name
2. Brief description
3. Indicators of Compromise - IPs, domains, file hashes, etc.
4. Techniques (TTPs)
5. MITRE ATT&CK tactics (e.g. Initial Access, Execution, Exfiltration)
6. Threat actor, if attributed
7. Target industries (e.g. Finance, Healthcare, Technology, Government, Energy)
8. Target regions (e.g. North America, Europe, Asia, Global)
9. Affected security solutions (e.g. SIEM, EDR, IDS/IPS, Firewall)
10. Severity (Critical, High, Medium, Low)
11. Recommended mitigation steps

Return ONLY a valid JSON object with this structure:
{
  \"name\": \"attack name\",
  \"description\": \"brief description\",
  \"indicators\": [\"indicator1\", \"indicator2\"],
  \"techniques\": [\"technique1\", \"technique2\"],
  \"mitre_tactics\": [\"tactic1\", \"tactic2\"],
  \"threat_actor\": \"actor or null\",
  \"industries\": [\"industry1\", \"industry2\"],
  \"regions\": [\"region1\", \"region2\"],
  \"sec_solutions\": [\"solution1\", \"solution2\"],
  \"severity\": \"High\",
  \"mitigations\": [\"step1\", \"step2\"]
}";

/// Per-article prompt handed to the reasoning service
pub fn article_prompt(article: &RawArticle) -> String {
    format!(
        "Analyze this cybersecurity threat article:\n\n\
         Title: {}\n\
         URL: {}\n\
         Summary: {}\n\n\
         Extract threat intelligence in JSON format.",
        article.title, article.source_url, article.summary
    )
}

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    Http(u16),
    #[error("response shape unexpected: {0}")]
    Shape(String),
}

/// Request/response completion boundary
#[async_trait]
pub trait ReasoningBackend: Send + Sync + 'static {
    /// One completion call: system instruction plus user prompt in, free
    /// text out. Callers own all retry policy; this issues exactly one
    /// request.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AnalystError>;
}

// =============================================================================
// Chat-completions backend
// =============================================================================

/// Production backend speaking the OpenAI-compatible chat-completions wire
/// format
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ReasoningBackend for ChatCompletionsBackend {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AnalystError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalystError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalystError::Http(response.status().as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalystError::Shape(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalystError::Shape("no completion choices".to_string()))
    }
}

// =============================================================================
// Scripted backend (tests)
// =============================================================================

/// Deterministic backend for tests: pops pre-scripted responses in order and
/// counts every call
#[derive(Default)]
pub struct ScriptedBackend {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<String, AnalystError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        self.responses.lock().push_back(Ok(response.into()));
    }

    pub fn push_err(&self, error: AnalystError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AnalystError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AnalystError::Network("script exhausted".to_string())))
    }
}
