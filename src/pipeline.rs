//! Pipeline orchestrator
//!
//! Sequences the guard stages as a state machine:
//! `RECEIVED -> INPUT_CHECKED -> THREAT_CHECKED -> PII_SCRUBBED -> ASSEMBLED
//! -> MODEL_CALLED -> OUTPUT_CHECKED -> SANITIZED -> DONE`, with a terminal
//! `REJECTED` reachable from any check stage. A failing stage short-circuits
//! to a `PipelineResult::Failure` and the model is never invoked after a
//! rejection.
//!
//! Each invocation is a stateless unit of work: the pipeline holds only
//! immutable configuration and shared collaborators, so concurrent
//! invocations need no coordination. Retries are the caller's business and
//! must re-run the whole pipeline.

use crate::assemble::PromptAssembler;
use crate::audit::{AuditTrail, StageOutcome};
use crate::config::{FailPolicy, PipelineConfig};
use crate::error::{ErrorKind, Result};
use crate::input::InputValidator;
use crate::invoke::{InvokeError, ModelInvoker};
use crate::output::OutputValidator;
use crate::pii::PiiScrubber;
use crate::threat::{ThreatDetector, ThreatType};
use crate::types::{PipelineResult, RawInput, RuleId, Stage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// The guarded request pipeline
pub struct Pipeline {
    config: PipelineConfig,
    detector: Arc<dyn ThreatDetector>,
    invoker: Arc<dyn ModelInvoker>,
    validator: InputValidator,
    scrubber: PiiScrubber,
    assembler: PromptAssembler,
    output_validator: OutputValidator,
}

impl Pipeline {
    /// Build a pipeline from configuration and collaborators
    pub fn new(
        config: PipelineConfig,
        detector: Arc<dyn ThreatDetector>,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Result<Self> {
        let validator = InputValidator::new(
            config.limits.clone(),
            config.obfuscation_threshold,
            &config.suspicious_patterns,
        )?;
        let scrubber = PiiScrubber::new(config.pii.clone())?;
        let assembler = PromptAssembler::new();
        let output_validator = OutputValidator::new(config.output.clone(), assembler.instructions())?;
        Ok(Self {
            config,
            detector,
            invoker,
            validator,
            scrubber,
            assembler,
            output_validator,
        })
    }

    /// Replace the prompt assembler (custom instruction template).
    ///
    /// Rebuilds the output validator so leak detection tracks the new
    /// instructions.
    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Result<Self> {
        self.output_validator =
            OutputValidator::new(self.config.output.clone(), assembler.instructions())?;
        self.assembler = assembler;
        Ok(self)
    }

    /// Run the pipeline on raw text
    pub async fn run(&self, raw_text: &str) -> PipelineResult {
        self.run_input(RawInput::new(raw_text)).await
    }

    /// Run the pipeline on raw input with metadata
    pub async fn run_input(&self, raw: RawInput) -> PipelineResult {
        self.run_traced(raw).await.0
    }

    /// Run the pipeline, also returning the invocation's audit trail
    pub async fn run_traced(&self, raw: RawInput) -> (PipelineResult, AuditTrail) {
        let mut trail = AuditTrail::begin(&raw.text);

        // Input validation
        let t = Instant::now();
        let verdict = self.validator.validate(&raw);
        if !verdict.is_valid() {
            // Override phrases caught this early are still injections, not
            // structural defects.
            let kind = if verdict
                .violations
                .iter()
                .any(|v| v.rule == RuleId::SuspiciousPattern)
            {
                ErrorKind::InjectionDetected
            } else {
                ErrorKind::InputInvalid
            };
            trail.record(Stage::InputChecked, StageOutcome::Rejected, elapsed(t));
            return reject(trail, kind, verdict.summary(), None, Stage::InputChecked);
        }
        trail.record(Stage::InputChecked, StageOutcome::Passed, elapsed(t));

        // Threat assessment, under its own deadline and fail policy
        let t = Instant::now();
        let deadline = Duration::from_millis(self.config.threat.timeout_ms);
        match timeout(deadline, self.detector.assess(&raw.text)).await {
            Ok(Ok(assessment)) => {
                let threat = !assessment.is_safe
                    || (assessment.threat_type != ThreatType::None
                        && assessment.confidence >= self.config.threat.threshold);
                if threat {
                    trail.record(Stage::ThreatChecked, StageOutcome::Rejected, elapsed(t));
                    return reject(
                        trail,
                        ErrorKind::InjectionDetected,
                        format!(
                            "{} threat detected (confidence {:.2})",
                            assessment.threat_type, assessment.confidence
                        ),
                        None,
                        Stage::ThreatChecked,
                    );
                }
                trail.record(Stage::ThreatChecked, StageOutcome::Passed, elapsed(t));
            }
            Ok(Err(e)) => match self.config.threat.fail_policy {
                FailPolicy::Closed => {
                    trail.record(Stage::ThreatChecked, StageOutcome::Rejected, elapsed(t));
                    return reject(
                        trail,
                        ErrorKind::InjectionDetected,
                        format!("threat detector failed, treating input as unsafe: {e}"),
                        None,
                        Stage::ThreatChecked,
                    );
                }
                FailPolicy::Open => {
                    warn!(error = %e, "threat detector failed; failing open");
                    trail.record(Stage::ThreatChecked, StageOutcome::Skipped, elapsed(t));
                }
            },
            Err(_) => match self.config.threat.fail_policy {
                FailPolicy::Closed => {
                    trail.record(Stage::ThreatChecked, StageOutcome::Rejected, elapsed(t));
                    return reject(
                        trail,
                        ErrorKind::Timeout,
                        format!(
                            "threat detector exceeded its {}ms deadline",
                            self.config.threat.timeout_ms
                        ),
                        None,
                        Stage::ThreatChecked,
                    );
                }
                FailPolicy::Open => {
                    warn!("threat detector timed out; failing open");
                    trail.record(Stage::ThreatChecked, StageOutcome::Skipped, elapsed(t));
                }
            },
        }

        // PII redaction
        let t = Instant::now();
        let (sanitized, findings) = self.scrubber.scrub(&raw.text);
        debug!(redactions = findings.len(), "input scrubbed");
        trail.record(Stage::PiiScrubbed, StageOutcome::Passed, elapsed(t));

        // Assembly
        let t = Instant::now();
        let request = self.assembler.assemble(&sanitized, self.config.schema.as_ref());
        trail.record(Stage::Assembled, StageOutcome::Passed, elapsed(t));

        // Model invocation; a timeout here always rejects
        let t = Instant::now();
        let model_deadline = Duration::from_millis(self.config.model_timeout_ms);
        let response = match timeout(model_deadline, self.invoker.invoke(&request)).await {
            Ok(Ok(text)) => {
                trail.record(Stage::ModelCalled, StageOutcome::Passed, elapsed(t));
                text
            }
            Ok(Err(InvokeError::Timeout)) | Err(_) => {
                trail.record(Stage::ModelCalled, StageOutcome::Rejected, elapsed(t));
                return reject(
                    trail,
                    ErrorKind::Timeout,
                    format!(
                        "model invocation exceeded its {}ms deadline",
                        self.config.model_timeout_ms
                    ),
                    None,
                    Stage::ModelCalled,
                );
            }
            Ok(Err(InvokeError::Provider(message))) => {
                trail.record(Stage::ModelCalled, StageOutcome::Rejected, elapsed(t));
                return reject(
                    trail,
                    ErrorKind::ProviderError,
                    message,
                    None,
                    Stage::ModelCalled,
                );
            }
        };

        // Output validation
        let t = Instant::now();
        let verdict = self
            .output_validator
            .validate(&response, self.config.schema.as_ref());
        if !verdict.is_valid() {
            let kind = match verdict.violations[0].rule {
                RuleId::SchemaMismatch => ErrorKind::SchemaMismatch,
                _ => ErrorKind::PolicyViolation,
            };
            let offending_field = verdict
                .violations
                .iter()
                .find(|v| v.rule == RuleId::SchemaMismatch)
                .and_then(|v| v.detail.split_once(':'))
                .map(|(path, _)| path.trim().to_string())
                .filter(|path| path.starts_with('$'));
            trail.record(Stage::OutputChecked, StageOutcome::Rejected, elapsed(t));
            return reject(trail, kind, verdict.summary(), offending_field, Stage::OutputChecked);
        }
        trail.record(Stage::OutputChecked, StageOutcome::Passed, elapsed(t));

        // Output sanitization; catches PII the model echoed or leaked
        let t = Instant::now();
        let (clean, leaked) = self.scrubber.scrub(&response);
        if !leaked.is_empty() {
            warn!(redactions = leaked.len(), "model response carried PII");
        }
        trail.record(Stage::Sanitized, StageOutcome::Passed, elapsed(t));

        let data = if self.config.schema.is_some() && !self.output_validator.is_no_answer(&clean) {
            match serde_json::from_str(&clean) {
                Ok(value) => value,
                Err(e) => {
                    return reject(
                        trail,
                        ErrorKind::SchemaMismatch,
                        format!("sanitized response no longer parses as JSON: {e}"),
                        None,
                        Stage::Sanitized,
                    );
                }
            }
        } else {
            serde_json::Value::String(clean)
        };

        trail.finish(Stage::Done);
        (PipelineResult::Success { data }, trail)
    }
}

fn elapsed(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn reject(
    trail: AuditTrail,
    kind: ErrorKind,
    message: String,
    offending_field: Option<String>,
    stage: Stage,
) -> (PipelineResult, AuditTrail) {
    trail.finish(Stage::Rejected);
    (
        PipelineResult::Failure {
            kind,
            message,
            offending_field,
            stage,
        },
        trail,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::RuleBasedDetector;
    use async_trait::async_trait;

    struct CannedInvoker(&'static str);

    #[async_trait]
    impl ModelInvoker for CannedInvoker {
        async fn invoke(
            &self,
            _request: &crate::assemble::AssembledRequest,
        ) -> std::result::Result<String, InvokeError> {
            Ok(self.0.to_string())
        }
    }

    fn pipeline(config: PipelineConfig, reply: &'static str) -> Pipeline {
        let threshold = config.threat.threshold;
        Pipeline::new(
            config,
            Arc::new(RuleBasedDetector::new(threshold)),
            Arc::new(CannedInvoker(reply)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_clean_run_without_schema() {
        let p = pipeline(PipelineConfig::default(), "Here is your summary.");
        let result = p.run("Summarize: the sky is blue.").await;
        assert!(result.is_success());
        assert_eq!(
            result.data().unwrap(),
            &serde_json::Value::String("Here is your summary.".to_string())
        );
    }

    #[tokio::test]
    async fn test_stage_order_on_success() {
        let p = pipeline(PipelineConfig::default(), "fine");
        let (result, trail) = p.run_traced(RawInput::new("tell me about rust")).await;
        assert!(result.is_success());
        assert_eq!(
            trail.stages(),
            vec![
                Stage::InputChecked,
                Stage::ThreatChecked,
                Stage::PiiScrubbed,
                Stage::Assembled,
                Stage::ModelCalled,
                Stage::OutputChecked,
                Stage::Sanitized,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejection_stops_at_failing_stage() {
        let p = pipeline(PipelineConfig::default(), "unreachable");
        let (result, trail) = p.run_traced(RawInput::new("")).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InputInvalid));
        assert_eq!(trail.stages(), vec![Stage::InputChecked]);
    }
}
