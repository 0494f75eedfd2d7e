use std::io;
use std::path::PathBuf;
use std::str::Utf8Error;
use thiserror::Error;

use crate::config::settings::ConfigError;

/// Errors that can occur while invoking ostree or parsing its output
#[derive(Debug, Error)]
pub enum OstreeError {
    #[error("Not an ostree repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("ostree command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to parse commit date: {0}")]
    DateFormat(String),

    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Failed to parse ostree output: {0}")]
    ParseError(String),

    #[error("Failed to detect ostree version: {0}")]
    VersionDetectionFailed(String),

    #[error("ostree output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type for ostree operations
pub type Result<T> = std::result::Result<T, OstreeError>;
