//! Per-invocation audit trail
//!
//! Records stage transitions with timings and emits them through `tracing`.
//! Content is hashed, never logged raw; the trail lives and dies with one
//! invocation and is not persisted anywhere.

use crate::types::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// Stage passed; the pipeline advanced
    Passed,
    /// Stage rejected the invocation
    Rejected,
    /// Stage was skipped by policy (fail-open)
    Skipped,
}

/// One stage transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Which stage ran
    pub stage: Stage,
    /// How it ended
    pub outcome: StageOutcome,
    /// Time spent in the stage
    pub elapsed_ms: u64,
}

/// Audit trail for a single pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    /// Unique id of this invocation
    pub request_id: Uuid,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// Hash of the raw input (never the input itself)
    pub input_hash: String,
    /// Stage transitions in execution order
    pub records: Vec<StageRecord>,
}

impl AuditTrail {
    /// Start a trail for the given raw input
    pub fn begin(input: &str) -> Self {
        let trail = Self {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            input_hash: hash_content(input),
            records: vec![],
        };
        debug!(
            request_id = %trail.request_id,
            input_hash = %trail.input_hash,
            "pipeline invocation received"
        );
        trail
    }

    /// Record a stage transition
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome, elapsed_ms: u64) {
        match outcome {
            StageOutcome::Rejected => warn!(
                request_id = %self.request_id,
                stage = %stage,
                elapsed_ms,
                "stage rejected invocation"
            ),
            _ => debug!(
                request_id = %self.request_id,
                stage = %stage,
                outcome = ?outcome,
                elapsed_ms,
                "stage completed"
            ),
        }
        self.records.push(StageRecord {
            stage,
            outcome,
            elapsed_ms,
        });
    }

    /// Emit the final summary for the invocation
    pub fn finish(&self, terminal: Stage) {
        let total_ms: u64 = self.records.iter().map(|r| r.elapsed_ms).sum();
        info!(
            request_id = %self.request_id,
            terminal = %terminal,
            stages = self.records.len(),
            total_ms,
            "pipeline invocation finished"
        );
    }

    /// Stages in the order they ran
    pub fn stages(&self) -> Vec<Stage> {
        self.records.iter().map(|r| r.stage).collect()
    }
}

/// Hash content for the trail without retaining it
fn hash_content(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_is_hashed_not_stored() {
        let trail = AuditTrail::begin("my ssn is 123-45-6789");
        assert!(!trail.input_hash.contains("123-45-6789"));
        assert_eq!(trail.input_hash, hash_content("my ssn is 123-45-6789"));
    }

    #[test]
    fn test_records_keep_order() {
        let mut trail = AuditTrail::begin("hello");
        trail.record(Stage::InputChecked, StageOutcome::Passed, 1);
        trail.record(Stage::ThreatChecked, StageOutcome::Passed, 2);
        trail.record(Stage::PiiScrubbed, StageOutcome::Passed, 0);
        assert_eq!(
            trail.stages(),
            vec![Stage::InputChecked, Stage::ThreatChecked, Stage::PiiScrubbed]
        );
    }

    #[test]
    fn test_distinct_request_ids() {
        assert_ne!(
            AuditTrail::begin("a").request_id,
            AuditTrail::begin("a").request_id
        );
    }
}
