//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a transaction connection) as the first argument.

pub mod job_repo;
pub mod output_item_repo;
pub mod task_repo;

pub use job_repo::JobRepo;
pub use output_item_repo::OutputItemRepo;
pub use task_repo::TaskRepo;
