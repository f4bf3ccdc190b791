use thiserror::Error;

/// Errors raised when a loaded configuration holds invalid values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    #[error("`elasticsearch.password` is set but `elasticsearch.username` is missing")]
    PasswordWithoutUsername,
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, constraint: &str) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}
