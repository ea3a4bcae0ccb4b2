//! Error type shared by the engine and the panel

use fp_data::DataError;
use thiserror::Error;

/// Errors surfaced synchronously to the caller of an engine or panel operation.
///
/// Missing or non-finite data is not an error: it maps to the sentinel key
/// and is only logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Unknown widget type, malformed descriptor or unknown field
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation on a disposed or unknown dimension, group, widget or filter
    #[error("state error: {0}")]
    State(String),
}

impl FilterError {
    pub fn configuration(message: impl Into<String>) -> Self {
        FilterError::Configuration(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        FilterError::State(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, FilterError::Configuration(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, FilterError::State(_))
    }
}

impl From<DataError> for FilterError {
    fn from(error: DataError) -> Self {
        FilterError::Configuration(error.to_string())
    }
}

pub type Result<T, E = FilterError> = std::result::Result<T, E>;
