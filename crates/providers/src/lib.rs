//! HTTP implementations of the pipeline's external collaborators.
//!
//! - [`replicate`]: model training, inference and face detection.
//! - [`stripe`]: checkout sessions and webhook signature verification.
//! - [`storage`]: object storage uploads and public URLs.
//! - [`fetcher`]: plain HTTP downloads.

pub mod config;
pub mod fetcher;
mod http;
pub mod replicate;
pub mod signature;
pub mod storage;
pub mod stripe;

pub use config::{ReplicateConfig, StorageConfig, StripeConfig};
pub use fetcher::HttpBlobFetcher;
pub use http::build_client;
pub use replicate::ReplicateClient;
pub use storage::HttpObjectStorage;
pub use stripe::StripeClient;
