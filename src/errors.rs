use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION: record {position} is missing required field '{field}'")]
    Validation { position: usize, field: &'static str },
    #[error("NOT_FOUND: no stored row with id {0}")]
    NotFound(i64),
    #[error("EMPTY_NOTE: note for row {0} is blank")]
    EmptyNote(i64),
    #[error("STORAGE: {0}")]
    Storage(String),
    #[error("INVALID_SETTINGS: {0}")]
    Settings(String),
    #[error("IMPORT_INVALID: {0}")]
    Import(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Import(value.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Import(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn malformed_json_surfaces_as_import_error() {
        let error: AppError = serde_json::from_str::<serde_json::Value>("{oops")
            .expect_err("malformed")
            .into();
        assert!(matches!(error, AppError::Import(_)));
        assert!(error.to_string().starts_with("IMPORT_INVALID:"));
    }
}
