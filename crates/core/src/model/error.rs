use thiserror::Error;

/// Errors raised while building descriptors or resolving models.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model already registered: {0}")]
    DuplicateModel(String),
    #[error("Record type already registered under model: {0}")]
    DuplicateType(String),
    #[error("Model not registered: {0}")]
    UnknownModel(String),
    #[error("Invalid model {model}: {detail}")]
    InvalidModel { model: String, detail: String },
}

/// Result type for model registration and lookup.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_model_display() {
        let error = ModelError::DuplicateModel("person".to_string());
        assert_eq!(error.to_string(), "Model already registered: person");
    }

    #[test]
    fn test_unknown_model_display() {
        let error = ModelError::UnknownModel("ghost".to_string());
        assert_eq!(error.to_string(), "Model not registered: ghost");
    }

    #[test]
    fn test_invalid_model_display() {
        let error = ModelError::InvalidModel {
            model: "person".to_string(),
            detail: "no id field declared".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid model person: no id field declared");
    }
}
