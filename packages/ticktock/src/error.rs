//! Error taxonomy for the dispatch engine.
//!
//! Each component boundary gets its own named error kind so callers can
//! match on failure class instead of string-sniffing. Call sites that only
//! need to propagate wrap these in `anyhow::Error` via `#[from]`.

use thiserror::Error;

/// Bad input supplied to the admin surface. Never enters the wheel.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("title must be at least 3 characters")]
    TitleTooShort,

    #[error("unknown IANA timezone: {0}")]
    UnknownTimezone(String),

    #[error("run_at_utc must not be in the past")]
    RunAtInPast,

    #[error("remind_before_minutes must be between 0 and 10080, got {0}")]
    RemindBeforeOutOfRange(i64),
}

/// Failure reading from or writing to the job store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(i64),
}

/// Failure publishing a due event to the broker.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish timed out")]
    Timeout,
}

/// Invalid wheel or broker configuration discovered at boot. Fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be set")]
    MissingRequired { key: &'static str },

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("wheel tick must be greater than zero")]
    InvalidTick,

    #[error("wheel slots must be at least 2, got {0}")]
    InvalidSlots(usize),
}
