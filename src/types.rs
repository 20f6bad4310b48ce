//! Core types for the guarded request pipeline

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Untrusted text plus its metadata.
///
/// Immutable once received; owned exclusively by a single pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    /// The untrusted text
    pub text: String,
    /// Per-request length cap; tightens (never loosens) the configured limit
    pub max_length: Option<usize>,
    /// Declared locale of the text (informational)
    pub locale: Option<String>,
}

impl RawInput {
    /// Wrap untrusted text with no extra metadata
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_length: None,
            locale: None,
        }
    }

    /// Set a per-request length cap
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set the declared locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Raw input received
    Received,
    /// Structural input validation passed
    InputChecked,
    /// Threat assessment passed
    ThreatChecked,
    /// PII redacted from the input
    PiiScrubbed,
    /// Request assembled
    Assembled,
    /// Model invoked
    ModelCalled,
    /// Output validated against policy and schema
    OutputChecked,
    /// Output sanitized
    Sanitized,
    /// Terminal success state
    Done,
    /// Terminal rejection state, reachable from any check stage
    Rejected,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Received => write!(f, "RECEIVED"),
            Stage::InputChecked => write!(f, "INPUT_CHECKED"),
            Stage::ThreatChecked => write!(f, "THREAT_CHECKED"),
            Stage::PiiScrubbed => write!(f, "PII_SCRUBBED"),
            Stage::Assembled => write!(f, "ASSEMBLED"),
            Stage::ModelCalled => write!(f, "MODEL_CALLED"),
            Stage::OutputChecked => write!(f, "OUTPUT_CHECKED"),
            Stage::Sanitized => write!(f, "SANITIZED"),
            Stage::Done => write!(f, "DONE"),
            Stage::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Identifier of a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    /// Text exceeds the length cap
    TooLong,
    /// Text is empty after trimming
    Empty,
    /// Text matches a known instruction-override phrase
    SuspiciousPattern,
    /// Non-alphanumeric character ratio exceeds the threshold
    Obfuscation,
    /// Response does not match the declared schema
    SchemaMismatch,
    /// Response matches a forbidden pattern
    PolicyViolation,
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleId::TooLong => write!(f, "TOO_LONG"),
            RuleId::Empty => write!(f, "EMPTY"),
            RuleId::SuspiciousPattern => write!(f, "SUSPICIOUS_PATTERN"),
            RuleId::Obfuscation => write!(f, "OBFUSCATION"),
            RuleId::SchemaMismatch => write!(f, "SCHEMA_MISMATCH"),
            RuleId::PolicyViolation => write!(f, "POLICY_VIOLATION"),
        }
    }
}

/// A single rule violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Which rule was violated
    pub rule: RuleId,
    /// Human-readable detail
    pub detail: String,
}

impl Violation {
    pub fn new(rule: RuleId, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

/// Outcome of a validation pass.
///
/// All violations are collected, not just the first, so a rejection can
/// report everything at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Violations in the order they were found
    pub violations: Vec<Violation>,
}

impl ValidationVerdict {
    /// A passing verdict with no violations
    pub fn pass() -> Self {
        Self::default()
    }

    /// Whether the verdict is passing
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Add a violation
    pub fn push(&mut self, rule: RuleId, detail: impl Into<String>) {
        self.violations.push(Violation::new(rule, detail));
    }

    /// Join all violation details into one message
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.rule, v.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The single tagged result returned to the caller.
///
/// Exactly one variant is produced per invocation; anticipated failures never
/// escape the pipeline as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineResult {
    /// The pipeline completed; `data` matches the declared schema when one
    /// was configured, and is a JSON string of the sanitized response
    /// otherwise.
    Success {
        data: serde_json::Value,
    },

    /// The pipeline rejected the invocation at `stage`.
    Failure {
        kind: ErrorKind,
        message: String,
        offending_field: Option<String>,
        stage: Stage,
    },
}

impl PipelineResult {
    /// Get the payload if the pipeline succeeded
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            PipelineResult::Success { data } => Some(data),
            PipelineResult::Failure { .. } => None,
        }
    }

    /// Get the error kind if the pipeline failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineResult::Success { .. } => None,
            PipelineResult::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Whether the pipeline succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    /// Whether the pipeline rejected the invocation
    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineResult::Failure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_collects_all_violations() {
        let mut verdict = ValidationVerdict::pass();
        assert!(verdict.is_valid());

        verdict.push(RuleId::TooLong, "5000 > 4000");
        verdict.push(RuleId::Obfuscation, "ratio 0.42");

        assert!(!verdict.is_valid());
        assert_eq!(verdict.violations.len(), 2);
        assert!(verdict.summary().contains("TOO_LONG"));
        assert!(verdict.summary().contains("OBFUSCATION"));
    }

    #[test]
    fn test_result_accessors() {
        let ok = PipelineResult::Success {
            data: serde_json::json!({"summary": "ok"}),
        };
        assert!(ok.is_success());
        assert!(ok.data().is_some());
        assert!(ok.error_kind().is_none());

        let err = PipelineResult::Failure {
            kind: ErrorKind::InputInvalid,
            message: "empty input".to_string(),
            offending_field: None,
            stage: Stage::InputChecked,
        };
        assert!(err.is_failure());
        assert_eq!(err.error_kind(), Some(ErrorKind::InputInvalid));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::PiiScrubbed.to_string(), "PII_SCRUBBED");
        assert_eq!(Stage::Rejected.to_string(), "REJECTED");
    }
}
