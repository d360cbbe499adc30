//! Expressr pipeline worker.
//!
//! Claims durable stage tasks from the queue and runs them through the
//! [`JobOrchestrator`](expressr_pipeline::JobOrchestrator). Also home to the
//! production wiring shared with the API binary.

pub mod config;
pub mod runner;
pub mod wiring;

pub use config::WorkerConfig;
pub use runner::TaskRunner;
