use thiserror::Error;

/// Errors raised while parsing pool configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotaError {
    #[error("weekday {0} out of range (expected 0..=6, Sunday = 0)")]
    InvalidWeekday(u8),
    #[error("unknown frequency '{0}' (expected daily or weekly)")]
    UnknownFrequency(String),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
}
