//! Detection Rule Synthesizer
//!
//! Renders two detection dialects per matched attack: a YARA signature rule
//! and a Sigma process-creation rule. The automatic pipeline never
//! overwrites existing rules for an attack; only the explicit admin
//! regeneration path replaces content.

use crate::store::IntelStore;
use crate::{AttackProfile, DetectionRule, RuleDialect};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Fallback string token when an attack carries no indicators
const FALLBACK_INDICATOR: &str = "malicious_indicator";

/// Fallback string token when an attack carries no techniques
const FALLBACK_TECHNIQUE: &str = "suspicious_behavior";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unknown attack: {0}")]
    UnknownAttack(String),
}

pub struct RuleSynthesizer {
    store: Arc<IntelStore>,
}

impl RuleSynthesizer {
    pub fn new(store: Arc<IntelStore>) -> Self {
        Self { store }
    }

    /// Ensure both dialects exist for this attack, skipping any dialect that
    /// was generated before. `sec_solutions` is the matched subscriber's
    /// solution set; rule content is solution-independent but the target set
    /// is recorded in the log line.
    pub fn ensure_rules(&self, attack: &AttackProfile, sec_solutions: &[String]) {
        let mut generated = 0;

        if !self.store.has_rule(&attack.id, RuleDialect::Yara) {
            let rule = self.build_yara(attack, &[], &[]);
            if self.store.insert_rule_if_absent(rule) {
                generated += 1;
            }
        }

        if !self.store.has_rule(&attack.id, RuleDialect::Sigma) {
            let rule = self.build_sigma(attack, &[], &[]);
            if self.store.insert_rule_if_absent(rule) {
                generated += 1;
            }
        }

        if generated > 0 {
            info!(
                attack = %attack.name,
                rules = generated,
                solutions = ?sec_solutions,
                "detection rules synthesized"
            );
        } else {
            debug!(attack = %attack.name, "rules already present, generation skipped");
        }
    }

    /// Admin path: rebuild both dialects folding in operator-supplied
    /// indicators/techniques and replace whatever exists for the attack.
    pub fn regenerate(
        &self,
        attack_id: &str,
        extra_indicators: &[String],
        extra_techniques: &[String],
    ) -> Result<Vec<DetectionRule>, RuleError> {
        let attack = self
            .store
            .attack(attack_id)
            .ok_or_else(|| RuleError::UnknownAttack(attack_id.to_string()))?;

        let yara = self.build_yara(&attack, extra_indicators, extra_techniques);
        let sigma = self.build_sigma(&attack, extra_indicators, extra_techniques);
        self.store.replace_rule(yara.clone());
        self.store.replace_rule(sigma.clone());

        info!(
            attack = %attack.name,
            extra_indicators = extra_indicators.len(),
            extra_techniques = extra_techniques.len(),
            "detection rules regenerated by operator"
        );
        Ok(vec![yara, sigma])
    }

    fn build_yara(
        &self,
        attack: &AttackProfile,
        extra_indicators: &[String],
        extra_techniques: &[String],
    ) -> DetectionRule {
        let name = sanitize_identifier(&attack.name);

        let mut strings = Vec::new();
        for (i, ioc) in primary_tokens(&attack.indicators, extra_indicators, FALLBACK_INDICATOR)
            .iter()
            .enumerate()
        {
            strings.push(format!("        $ioc{} = \"{}\"", i + 1, escape_quotes(ioc)));
        }
        for (i, ttp) in primary_tokens(&attack.techniques, extra_techniques, FALLBACK_TECHNIQUE)
            .iter()
            .enumerate()
        {
            strings.push(format!("        $ttp{} = \"{}\"", i + 1, escape_quotes(ttp)));
        }

        let content = format!(
            r#"rule {name}_Detection
{{
    meta:
        description = "{description}"
        severity = "{severity}"
        threat_actor = "{actor}"
        source = "{source}"
        mitre_tactics = "{tactics}"

    strings:
{strings}

    condition:
        any of them
}}"#,
            name = name,
            description = escape_quotes(&attack.description),
            severity = attack.severity,
            actor = escape_quotes(attack.threat_actor.as_deref().unwrap_or("Unknown")),
            source = attack.source_url,
            tactics = attack.mitre_tactics.join(", "),
            strings = strings.join("\n"),
        );

        DetectionRule {
            id: uuid::Uuid::new_v4().to_string(),
            attack_id: attack.id.clone(),
            dialect: RuleDialect::Yara,
            rule_name: format!("{}_Yara", name),
            content,
        }
    }

    fn build_sigma(
        &self,
        attack: &AttackProfile,
        extra_indicators: &[String],
        extra_techniques: &[String],
    ) -> DetectionRule {
        let name = sanitize_identifier(&attack.name);

        let mut selection = Vec::new();
        for token in primary_tokens(&attack.indicators, extra_indicators, "malicious") {
            selection.push(format!("            - '{}'", token.replace('\'', "")));
        }
        for token in primary_tokens(&attack.techniques, extra_techniques, "suspicious") {
            selection.push(format!("            - '{}'", token.replace('\'', "")));
        }

        let tags: Vec<String> = attack
            .mitre_tactics
            .iter()
            .map(|t| format!("    - attack.{}", slug_case(t)))
            .collect();
        let tags_block = if tags.is_empty() {
            String::new()
        } else {
            format!("tags:\n{}\n", tags.join("\n"))
        };

        let content = format!(
            r#"title: {title} Detection
id: {id}
status: experimental
description: Detects {description}
author: IntelliSecure AI
date: {date}
references:
    - {source}
{tags_block}logsource:
    category: process_creation
    product: windows
detection:
    selection:
        CommandLine|contains:
{selection}
    condition: selection
falsepositives:
    - Unknown
level: {level}"#,
            title = attack.name,
            id = uuid::Uuid::new_v4(),
            description = attack.description,
            date = chrono::Utc::now().format("%Y/%m/%d"),
            source = attack.source_url,
            tags_block = tags_block,
            selection = selection.join("\n"),
            level = attack.severity.sigma_level(),
        );

        DetectionRule {
            id: uuid::Uuid::new_v4().to_string(),
            attack_id: attack.id.clone(),
            dialect: RuleDialect::Sigma,
            rule_name: format!("{}_Sigma", name),
            content,
        }
    }
}

/// First extracted token plus any operator-supplied extras; the fallback
/// literal stands in when both are empty
fn primary_tokens(extracted: &[String], extras: &[String], fallback: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    match extracted.first() {
        Some(first) => tokens.push(first.clone()),
        None if extras.is_empty() => tokens.push(fallback.to_string()),
        None => {}
    }
    tokens.extend(extras.iter().cloned());
    tokens
}

/// Collapse an attack name into a YARA-safe identifier
fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

/// Slug-case a MITRE tactic name for Sigma tags
fn slug_case(tactic: &str) -> String {
    tactic
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
