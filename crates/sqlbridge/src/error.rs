//! Error types for connection sessions and dialect rendering.

use thiserror::Error;

/// Main error type for session and dialect operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration error (invalid YAML, missing fields, bad attribute values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A physical connection could not be opened or resolved
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// No dialect is registered under the requested plugin id
    #[error("Unknown database dialect: {0}")]
    DialectNotFound(String),

    /// A statement could not be prepared
    #[error("Unable to prepare statement: {message}\n  SQL: {sql}")]
    StatementPreparation { sql: String, message: String },

    /// A single statement failed
    #[error("Error executing statement: {message}\n  SQL: {sql}")]
    Execution { sql: String, message: String },

    /// A batched execution failed part way through.
    ///
    /// `update_counts` holds one entry per buffered statement the driver
    /// reported on before the failure point (`None` when the driver reported
    /// none). `causes` holds every chained native error, outermost first.
    #[error("Error updating batch: {message}")]
    BatchExecution {
        message: String,
        update_counts: Option<Vec<i64>>,
        causes: Vec<String>,
    },

    /// The dialect or driver does not offer the requested operation
    #[error("Operation not supported by {dialect}: {operation}")]
    Unsupported { dialect: String, operation: String },

    /// The partition id is not part of the connection's cluster definition
    #[error("Partition '{partition}' not found in connection '{connection}'")]
    PartitionNotFound {
        connection: String,
        partition: String,
    },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The session is not connected
    #[error("Session for connection '{0}' is not connected")]
    NotConnected(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        DbError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        DbError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Execution error carrying the attempted SQL
    pub fn execution(sql: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DbError::Execution {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create a StatementPreparation error carrying the attempted SQL
    pub fn preparation(sql: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DbError::StatementPreparation {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create an Unsupported error
    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        DbError::Unsupported {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// Number of buffered statements the driver confirmed before a batch failed.
    ///
    /// Counts entries that are not the driver's failure marker (`-3`).
    pub fn batch_succeeded(&self) -> Option<usize> {
        match self {
            DbError::BatchExecution {
                update_counts: Some(counts),
                ..
            } => Some(counts.iter().filter(|c| **c != EXECUTE_FAILED).count()),
            _ => None,
        }
    }

    /// Process exit code used by the command line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            DbError::Config(_) | DbError::Yaml(_) | DbError::Json(_) => 2,
            DbError::DialectNotFound(_) | DbError::PartitionNotFound { .. } => 3,
            DbError::Connection { .. } | DbError::Pool { .. } | DbError::NotConnected(_) => 4,
            DbError::Io(_) => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let DbError::BatchExecution { causes, .. } = self {
            for (depth, cause) in causes.iter().enumerate() {
                output.push_str(&format!("\nCaused by:\n  {}: {}", depth + 1, cause));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Update count a driver reports for a batched statement that failed.
pub const EXECUTE_FAILED: i64 = -3;

/// Result type alias for session and dialect operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_succeeded_skips_failed_entries() {
        let err = DbError::BatchExecution {
            message: "duplicate key".into(),
            update_counts: Some(vec![1, 1, EXECUTE_FAILED, 1]),
            causes: vec!["duplicate key".into()],
        };
        assert_eq!(err.batch_succeeded(), Some(3));

        let err = DbError::BatchExecution {
            message: "driver gave up".into(),
            update_counts: None,
            causes: vec![],
        };
        assert_eq!(err.batch_succeeded(), None);
    }

    #[test]
    fn test_format_detailed_lists_chained_causes() {
        let err = DbError::BatchExecution {
            message: "batch failed".into(),
            update_counts: Some(vec![1]),
            causes: vec!["first".into(), "second".into()],
        };
        let text = err.format_detailed();
        assert!(text.contains("1: first"));
        assert!(text.contains("2: second"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DbError::Config("x".into()).exit_code(), 2);
        assert_eq!(DbError::DialectNotFound("x".into()).exit_code(), 3);
        assert_eq!(DbError::connection("refused", "connect").exit_code(), 4);
        assert_eq!(DbError::execution("SELECT 1", "boom").exit_code(), 1);
    }
}
