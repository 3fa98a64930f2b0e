//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for incremental runs.
#[derive(Debug, thiserror::Error)]
pub enum IncrementalError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(
        "resume target does not make progress: end_date {end_date} must be after {last_end_time}, the end of the previous run"
    )]
    NoProgress {
        end_date: NaiveDate,
        last_end_time: NaiveDate,
    },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("corrupt {key} payload: {reason}")]
    Serialization { key: String, reason: String },

    #[error("analytics error: {reason}")]
    Analytics { reason: String },

    #[error("lifecycle error: {reason}")]
    Lifecycle { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IncrementalError {
    /// Configuration errors are fatal at startup and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IncrementalError::ConfigParse { .. }
                | IncrementalError::ConfigMissing { .. }
                | IncrementalError::ConfigInvalid { .. }
                | IncrementalError::NoProgress { .. }
        )
    }

    pub(crate) fn storage(reason: impl std::fmt::Display) -> Self {
        IncrementalError::Storage {
            reason: reason.to_string(),
        }
    }
}

impl From<&IncrementalError> for std::process::ExitCode {
    fn from(err: &IncrementalError) -> Self {
        let code: u8 = match err {
            IncrementalError::Io(_) => 1,
            IncrementalError::ConfigParse { .. }
            | IncrementalError::ConfigMissing { .. }
            | IncrementalError::ConfigInvalid { .. } => 2,
            IncrementalError::NoProgress { .. } => 3,
            IncrementalError::Storage { .. } | IncrementalError::Serialization { .. } => 4,
            IncrementalError::Lifecycle { .. } => 5,
            IncrementalError::Analytics { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
