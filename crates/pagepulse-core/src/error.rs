use thiserror::Error;

/// Failures raised by normalisation, assembly, and request shaping.
///
/// None of these are retried or suppressed inside the core; they propagate
/// to the caller, which decides whether to skip the observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An option outside its enumerated values (query type, strategy, category).
    #[error("invalid {option}: {value:?} (expected one of: {expected})")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The upstream payload lacks a field the normaliser depends on.
    #[error("missing field in upstream payload: {0}")]
    MissingField(String),

    /// Not enough input to produce any output.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub fn missing(path: impl Into<String>) -> Self {
        Self::MissingField(path.into())
    }
}
