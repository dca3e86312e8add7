use thiserror::Error;

/// A request entry that cannot be processed as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{entry}`: {reason}")]
pub struct ValidationError {
    pub entry: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}
