pub mod faces;
pub mod jobs;
pub mod recovery;
pub mod webhooks;
