use std::path::PathBuf;
use thiserror::Error;

/// Report persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A report with the same name already exists; reports are never overwritten
    #[error("Report already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A file in the report directory is not a valid report
    #[error("Invalid report {}: {reason}", path.display())]
    InvalidReport { path: PathBuf, reason: String },
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_display() {
        let error = StorageError::AlreadyExists(PathBuf::from("reports/a.json"));
        assert_eq!(error.to_string(), "Report already exists: reports/a.json");
    }
}
