use thiserror::Error;

#[derive(Error, Debug)]
pub enum CategorizeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl CategorizeError {
    /// Rejected before any source was consulted.
    pub fn is_input_error(&self) -> bool {
        matches!(self, CategorizeError::InvalidInput(_))
    }

    /// Configuration or data errors: no partial result exists.
    pub fn is_fatal(&self) -> bool {
        !self.is_input_error()
    }
}

pub type Result<T> = std::result::Result<T, CategorizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_distinct_from_fatal() {
        let input = CategorizeError::InvalidInput("empty description".into());
        assert!(input.is_input_error());
        assert!(!input.is_fatal());

        let tenant = CategorizeError::TenantNotFound("acme".into());
        assert!(tenant.is_fatal());
        assert_eq!(tenant.to_string(), "Tenant not found: acme");
    }
}
