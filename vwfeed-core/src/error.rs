//! Error types for the vwfeed core library.
//!
//! Uses `thiserror` for public API error types, one enum per failure domain:
//! schema lookup, job configuration, feature encoding and engine execution.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the vwfeed core library.
#[derive(Debug, thiserror::Error)]
pub enum VwFeedError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Errors from the schema/catalog collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Table not found: {db}.{table}")]
    TableNotFound { db: String, table: String },

    #[error("Table {db}.{table} has no columns")]
    NoColumns { db: String, table: String },

    #[error("Column '{column}' not found in {db}.{table}")]
    MissingColumn {
        db: String,
        table: String,
        column: String,
    },

    #[error("No storage location reported for {db}.{table}")]
    NoLocation { db: String, table: String },

    #[error("Catalog lookup for {db}.{table} failed: {message}")]
    LookupFailed {
        db: String,
        table: String,
        message: String,
    },

    #[error("Failed to read schema file {path}: {message}")]
    SchemaFile { path: PathBuf, message: String },
}

/// Errors from job specification and configuration handling.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Source table '{value}' must be of the form db.table")]
    SourceNotQualified { value: String },

    #[error("Destination table '{value}' must not carry a database qualifier")]
    DestinationQualified { value: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the per-column type encoder.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Column '{column}' has unsupported type '{data_type}'")]
    UnsupportedType { column: String, data_type: String },
}

/// Errors from running a query through the engine subprocess.
///
/// A non-zero engine exit is not an error at this level; it is carried in
/// [`crate::types::ExecutionResult`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to write query file in {dir}: {source}")]
    ArtifactIo {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn engine '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up engine output pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("Failed to wait for engine process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Engine run timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Engine run was cancelled")]
    Cancelled,
}

/// A type alias for results using the top-level `VwFeedError`.
pub type Result<T> = std::result::Result<T, VwFeedError>;
