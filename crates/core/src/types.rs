/// Job identifiers are UUIDv7 so they sort by creation time.
pub type JobId = uuid::Uuid;

/// Surrogate keys for internal rows (pipeline tasks) are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
