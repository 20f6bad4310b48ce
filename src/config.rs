//! Configuration for the guarded request pipeline
//!
//! The configuration is an explicit, immutable object passed into each
//! pipeline invocation; there is no process-wide registry.

use crate::pii::PiiCategory;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input length limits
    pub limits: InputLimits,
    /// Non-alphanumeric ratio above which input is rejected as obfuscated
    pub obfuscation_threshold: f32,
    /// Extra instruction-override phrase patterns (regex), on top of the
    /// built-in set
    pub suspicious_patterns: Vec<String>,
    /// Threat detector configuration
    pub threat: ThreatConfig,
    /// PII detection configuration
    pub pii: PiiConfig,
    /// Output policy
    pub output: OutputPolicy,
    /// Deadline for the model invocation, in milliseconds
    pub model_timeout_ms: u64,
    /// Expected response schema, if the caller declared one
    pub schema: Option<Schema>,
}

impl PipelineConfig {
    /// Declare an expected response schema
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Input length limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLimits {
    /// Maximum input length in characters
    pub max_length: usize,
    /// Minimum input length in characters, after trimming
    pub min_length: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_length: 4000,
            min_length: 1,
        }
    }
}

/// Policy for an inconclusive threat check (detector failure or timeout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailPolicy {
    /// Treat inconclusive as unsafe and reject
    Closed,
    /// Treat inconclusive as safe, with a logged warning
    Open,
}

/// Threat detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatConfig {
    /// Confidence at or above which a threat assessment rejects the input
    pub threshold: f32,
    /// What to do when the detector itself fails or times out
    pub fail_policy: FailPolicy,
    /// Deadline for the detector call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            // A false block is cheaper than a missed injection.
            fail_policy: FailPolicy::Closed,
            timeout_ms: 5000,
        }
    }
}

/// PII detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiConfig {
    /// Categories to detect and redact
    pub categories: HashSet<PiiCategory>,
    /// Extra patterns (regex) redacted under the `Custom` category
    pub custom_patterns: Vec<String>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            categories: [
                PiiCategory::Email,
                PiiCategory::Phone,
                PiiCategory::Ssn,
                PiiCategory::CreditCard,
                PiiCategory::ApiKey,
            ]
            .into_iter()
            .collect(),
            custom_patterns: vec![],
        }
    }
}

/// Output validation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPolicy {
    /// Forbidden content patterns (regex)
    pub forbidden_patterns: Vec<String>,
    /// Sentinel phrase for "no answer available"; never treated as a failure
    pub no_answer_sentinel: String,
    /// Window size, in characters, for detecting verbatim fragments of the
    /// system instructions in the response
    pub instruction_overlap_window: usize,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            forbidden_patterns: vec![
                r"(?i)my (system )?(prompt|instructions) (are|is|say)".to_string(),
                r"(?i)i am no longer (an?|the) assistant".to_string(),
                r"(?i)i will now act as".to_string(),
            ],
            no_answer_sentinel: "No answer available".to_string(),
            instruction_overlap_window: 24,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: InputLimits::default(),
            obfuscation_threshold: 0.3,
            suspicious_patterns: vec![],
            threat: ThreatConfig::default(),
            pii: PiiConfig::default(),
            output: OutputPolicy::default(),
            model_timeout_ms: 30_000,
            schema: None,
        }
    }
}
