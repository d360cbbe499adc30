//! Expressr domain core.
//!
//! Pure domain logic shared by every other crate: job and output item
//! types, the job status transition rules, the style catalog, the
//! regeneration quota and duplicate-submission window, and the collaborator
//! traits (storage, queue, external providers) that the pipeline is wired
//! against. No I/O lives here.

pub mod dedup;
pub mod error;
pub mod job;
pub mod providers;
pub mod quota;
pub mod status;
pub mod store;
pub mod styles;
pub mod tasks;
pub mod types;
pub mod validation;
