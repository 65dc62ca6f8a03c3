//! Error handling for the backup center
//!
//! Every engine operation returns [`BackupResult`]. Caller-facing failures
//! (bad input, paths outside the sandbox, missing files) are kept apart from
//! infrastructure failures so the RPC layer can map them without guessing.

use thiserror::Error;

/// Main error type for archive and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Permission denied: {message}")]
    Permission { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("Path is outside the private storage root")]
    OutsideSandbox,

    #[error("Resource not found: {resource} - {id}")]
    NotFound { resource: String, id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database operation failed: {operation} - {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundle operation failed: {operation}")]
    Bundle {
        operation: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Dump generation failed: {message}")]
    Dump { message: String },

    #[error("Failed to spawn restore process: {message}")]
    Spawn { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Result with BackupError
pub type BackupResult<T> = Result<T, BackupError>;

impl BackupError {
    /// Create a permission error
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a bundle (zip) error
    pub fn bundle(operation: impl Into<String>, source: zip::result::ZipError) -> Self {
        Self::Bundle {
            operation: operation.into(),
            source,
        }
    }

    /// Create a dump generation error
    pub fn dump(message: impl Into<String>) -> Self {
        Self::Dump {
            message: message.into(),
        }
    }

    /// Create a process spawn error
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures caused by the caller's input rather than the host.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BackupError::Validation { .. }
                | BackupError::InvalidPath { .. }
                | BackupError::OutsideSandbox
                | BackupError::NotFound { .. }
        )
    }
}

/// Convert from sled errors
impl From<sled::Error> for BackupError {
    fn from(err: sled::Error) -> Self {
        BackupError::database("sled_operation", err)
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::serialization("json_operation", err)
    }
}

/// Convert from std::io errors
impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::io("io_operation", err)
    }
}

/// Convert from zip errors
impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        BackupError::bundle("zip_operation", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BackupError::validation("db_file", "Database backup must be a .sql or .sql.gz file.");
        assert!(err.to_string().contains("Validation error"));
        assert!(err.is_validation());

        let perm = BackupError::permission("requires System Manager");
        assert!(!perm.is_validation());
    }

    #[test]
    fn test_path_errors_are_validation_failures() {
        assert!(BackupError::OutsideSandbox.is_validation());
        assert!(BackupError::invalid_path("Invalid archive path.").is_validation());
        assert!(BackupError::not_found("file", "x.sql").is_validation());
        assert!(!BackupError::dump("bench exited with 1").is_validation());
    }

    #[test]
    fn test_error_chaining() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err = BackupError::io("reading dump", io_err);

        assert!(err.source().is_some());
        assert!(err.to_string().contains("I/O operation failed"));
    }
}
