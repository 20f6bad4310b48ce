//! Structural validation of raw input
//!
//! Deterministic checks only: length, emptiness, known instruction-override
//! phrases, and a non-alphanumeric ratio heuristic against obfuscated
//! payloads. No model call is involved; the same input and configuration
//! always produce the same verdict.

use crate::config::InputLimits;
use crate::error::{GateError, Result};
use crate::types::{RawInput, RuleId, ValidationVerdict};
use regex::Regex;

/// Phrases that signal an instruction-override attempt, checked before any
/// model is involved. Case-insensitive.
const OVERRIDE_PATTERNS: &[&str] = &[
    r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions",
    r"(?i)disregard\s+(all\s+)?(previous|above|your)\s+(instructions|rules)",
    r"(?i)forget\s+(everything|all)\s+(you|above)",
    r"(?i)(reveal|show|print|repeat)\s+(me\s+)?(your|the)\s+(system\s+)?(prompt|instructions)",
    r"(?i)you\s+are\s+now\s+(a|an|the)\b",
    r"(?i)pretend\s+(to\s+be|you\s+are)",
    r"(?i)new\s+instructions\s*:",
    // Delimiter-spoofing tokens from common chat templates
    r"<<SYS>>|\[INST\]|<\|im_start\|>|<\|endoftext\|>",
    r"(?im)^\s*system\s*:",
];

/// Structural input validator
pub struct InputValidator {
    limits: InputLimits,
    obfuscation_threshold: f32,
    patterns: Vec<Regex>,
}

impl InputValidator {
    /// Create a validator with the built-in override patterns plus any
    /// configured extras.
    pub fn new(
        limits: InputLimits,
        obfuscation_threshold: f32,
        extra_patterns: &[String],
    ) -> Result<Self> {
        let mut patterns: Vec<Regex> = OVERRIDE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect();
        for p in extra_patterns {
            patterns.push(
                Regex::new(p)
                    .map_err(|e| GateError::Config(format!("bad suspicious pattern {p:?}: {e}")))?,
            );
        }
        Ok(Self {
            limits,
            obfuscation_threshold,
            patterns,
        })
    }

    /// Validate raw input, collecting every violation.
    pub fn validate(&self, raw: &RawInput) -> ValidationVerdict {
        let mut verdict = ValidationVerdict::pass();
        let len = raw.text.chars().count();

        // A per-request cap may tighten, never loosen, the configured one.
        let max_length = raw
            .max_length
            .map_or(self.limits.max_length, |m| m.min(self.limits.max_length));

        if len > max_length {
            verdict.push(
                RuleId::TooLong,
                format!("input is {len} characters, limit is {max_length}"),
            );
        }

        let trimmed_len = raw.text.trim().chars().count();
        if trimmed_len < self.limits.min_length {
            verdict.push(
                RuleId::Empty,
                format!(
                    "input is {trimmed_len} characters after trimming, minimum is {}",
                    self.limits.min_length
                ),
            );
        }

        for pattern in &self.patterns {
            if let Some(m) = pattern.find(&raw.text) {
                verdict.push(
                    RuleId::SuspiciousPattern,
                    format!("matched {:?} at byte {}", m.as_str(), m.start()),
                );
            }
        }

        if trimmed_len > 0 {
            let ratio = non_alphanumeric_ratio(&raw.text);
            if ratio > self.obfuscation_threshold {
                verdict.push(
                    RuleId::Obfuscation,
                    format!(
                        "non-alphanumeric ratio {ratio:.2} exceeds {:.2}",
                        self.obfuscation_threshold
                    ),
                );
            }
        }

        verdict
    }
}

/// Ratio of non-alphanumeric characters among non-whitespace characters.
fn non_alphanumeric_ratio(text: &str) -> f32 {
    let mut total = 0usize;
    let mut symbols = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if !c.is_alphanumeric() {
            symbols += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    symbols as f32 / total as f32
}
