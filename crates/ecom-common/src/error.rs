//! Error types for ecom-etl

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for the pipeline
///
/// Variants fall into two groups. Run-level errors (`Load`, `SchemaMismatch`,
/// `Config`, `Io`, `Serialization`) abort the whole run before any target is
/// touched. Target-level errors carry the target name and only end the work
/// against that target.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Failed to load document '{document}': {reason}")]
    Load { document: String, reason: String },

    #[error("Schema mismatch in row {row} (source '{source_name}'), field '{field}': {reason}")]
    SchemaMismatch {
        row: usize,
        source_name: String,
        field: String,
        reason: String,
    },

    #[error("Cannot connect to target '{target}': {reason}")]
    TargetConnection { target: String, reason: String },

    #[error("Constraint violation on target '{target}' for {entity} {key}: {reason}")]
    ConstraintViolation {
        target: String,
        entity: String,
        key: String,
        reason: String,
    },

    #[error("Write failed on target '{target}' for {entity} {key}: {reason}")]
    TargetWrite {
        target: String,
        entity: String,
        key: String,
        reason: String,
    },

    #[error("Schema initialization failed on target '{target}' for table {table}: {reason}")]
    Schema {
        target: String,
        table: String,
        reason: String,
    },

    #[error("Transaction failed on target '{target}': {reason}")]
    Transaction { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EtlError {
    pub fn load(document: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::Load {
            document: document.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(
        row: usize,
        source_name: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EtlError::SchemaMismatch {
            row,
            source_name: source_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
