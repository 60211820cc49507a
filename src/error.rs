use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SomaError {
    #[error("unsupported column types in columns: {}", .0.join(", "))]
    UnsupportedColumns(Vec<String>),

    #[error("cannot find index column '{0}'")]
    MissingIndex(String),

    #[error("index column names not found in table: {}", .0.join(", "))]
    MissingIndexColumns(Vec<String>),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("incompatible request: {0}")]
    IncompatibleRequest(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid element type: {0}")]
    InvalidElementType(String),

    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    #[error("artifact already exists at {0}")]
    AlreadyExists(String),

    #[error("no artifact found at {0}")]
    NotFound(String),

    #[error("storage engine rejected write: {0}")]
    Storage(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
