//! Row structs mapping the database tables.
//!
//! Rows stay close to the schema; conversion into `expressr_core` domain
//! types happens in `TryFrom` impls so bad lookup ids surface as errors.

pub mod job;
pub mod task;
