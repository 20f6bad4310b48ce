//! # Prompt Gate
//!
//! A guarded request pipeline for mediating untrusted text through a
//! generative model call.
//!
//! Every invocation runs the same gauntlet: structural validation, threat
//! assessment, PII redaction, isolated prompt assembly, the model call, then
//! policy/schema validation and sanitization of the response. A failure at
//! any check stage short-circuits to a structured error and the model is
//! never invoked.
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────────────────┐   ┌──────────────┐
//! │ Raw text │ ─►│ Prompt Gate                         │ ─►│ Model        │
//! └──────────┘   │                                     │   │ (opaque)     │
//!                │  input check ─► threat check        │   └──────┬───────┘
//!                │       ─► PII scrub ─► assemble ──────────►     │
//!                │                                     │          │
//!                │  output check ◄─ sanitize ◄──────────────◄─────┘
//!                └──────────────────┬──────────────────┘
//!                                   ▼
//!                     PipelineResult::Success | Failure
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use prompt_gate::{
//!     AssembledRequest, InvokeError, ModelInvoker, Pipeline, PipelineConfig, PipelineResult,
//!     RuleBasedDetector,
//! };
//! use std::sync::Arc;
//!
//! struct EchoModel;
//!
//! #[async_trait::async_trait]
//! impl ModelInvoker for EchoModel {
//!     async fn invoke(&self, request: &AssembledRequest) -> Result<String, InvokeError> {
//!         Ok(format!(
//!             "Received {} characters of sanitized input.",
//!             request.sanitized_payload.len()
//!         ))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PipelineConfig::default();
//!     let detector = Arc::new(RuleBasedDetector::new(config.threat.threshold));
//!     let pipeline = Pipeline::new(config, detector, Arc::new(EchoModel)).unwrap();
//!
//!     match pipeline.run("Please summarize: the sky is blue.").await {
//!         PipelineResult::Success { data } => println!("ok: {data}"),
//!         PipelineResult::Failure { kind, message, .. } => println!("{kind}: {message}"),
//!     }
//! }
//! ```
//!
//! Each invocation is stateless and owns its data; a `Pipeline` can be shared
//! across tasks and run concurrently without coordination.

pub mod assemble;
pub mod audit;
pub mod config;
pub mod error;
pub mod input;
pub mod invoke;
pub mod output;
pub mod pii;
pub mod pipeline;
pub mod schema;
pub mod threat;
pub mod types;

pub use assemble::{AssembledRequest, PromptAssembler};
pub use config::{FailPolicy, OutputPolicy, PiiConfig, PipelineConfig, ThreatConfig};
pub use error::{ErrorKind, GateError};
#[cfg(feature = "http-invoker")]
pub use invoke::HttpInvoker;
pub use invoke::{InvokeError, ModelInvoker};
pub use pii::{PiiCategory, PiiFinding, PiiScrubber};
pub use pipeline::Pipeline;
pub use schema::Schema;
pub use threat::{
    ModelBackedDetector, RuleBasedDetector, ThreatAssessment, ThreatDetector, ThreatType,
};
pub use types::{PipelineResult, RawInput, Stage, ValidationVerdict, Violation};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assemble::{AssembledRequest, PromptAssembler};
    pub use crate::config::{FailPolicy, PipelineConfig};
    pub use crate::error::{ErrorKind, GateError};
    pub use crate::invoke::{InvokeError, ModelInvoker};
    pub use crate::pii::{PiiCategory, PiiFinding, PiiScrubber};
    pub use crate::pipeline::Pipeline;
    pub use crate::schema::Schema;
    pub use crate::threat::{RuleBasedDetector, ThreatAssessment, ThreatDetector, ThreatType};
    pub use crate::types::{PipelineResult, RawInput, Stage};
}
