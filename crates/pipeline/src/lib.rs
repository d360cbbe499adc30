//! Expressr job pipeline.
//!
//! - [`normalizer`]: turns heterogeneous inference output into owned URLs.
//! - [`driver`]: calls the inference provider per style with pacing,
//!   timeouts and retries.
//! - [`orchestrator`]: the job state machine and every externally visible
//!   operation (create, train, webhooks, generation stages, regenerate,
//!   checkout, recovery).
//! - [`archive`]: training photo packaging.
//! - [`memory`]: in-process `JobStore` / `TaskQueue` implementations.

pub mod archive;
pub mod driver;
pub mod memory;
pub mod normalizer;
pub mod orchestrator;

pub use driver::{GenerationConfig, GenerationDriver, StyleOutcome};
pub use normalizer::OutputNormalizer;
pub use orchestrator::{
    Collaborators, JobOrchestrator, OrchestratorConfig, RegenerateResult, TaskOutcome,
    WebhookAck, GENERATION_STALLED_MESSAGE,
};
