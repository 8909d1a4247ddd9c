//! Error types for the Kolosal trainer

use thiserror::Error;

/// Result type alias for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Main error type for the trainer
#[derive(Error, Debug)]
pub enum TrainerError {
    /// An edge references a model that is not registered
    #[error("Dependency error: {0}")]
    DependencyError(String),

    /// Unknown model or attribute lookup
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Best model requested but no model can answer
    #[error("No models available: {0}")]
    NoModelsError(String),

    /// Refit-full cannot merge the supplied validation data
    #[error("Unsupported refit: {0}")]
    UnsupportedRefitError(String),

    /// Opaque per-model fit/score/save failure
    #[error("Training failure: {0}")]
    TrainingFailure(String),

    /// Base models passed for a model that cannot consume them
    #[error("Type invariant violated: {0}")]
    TypeInvariantError(String),

    #[error("Model name already registered: {0}")]
    DuplicateModelError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for TrainerError {
    fn from(err: serde_json::Error) -> Self {
        TrainerError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TrainerError {
    fn from(err: ndarray::ShapeError) -> Self {
        TrainerError::DataError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainerError::DependencyError("base model 'Naive' is not registered".to_string());
        assert_eq!(
            err.to_string(),
            "Dependency error: base model 'Naive' is not registered"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrainerError = io_err.into();
        assert!(matches!(err, TrainerError::IoError(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TrainerError = json_err.into();
        assert!(matches!(err, TrainerError::SerializationError(_)));
    }
}
