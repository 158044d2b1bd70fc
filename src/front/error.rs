//! The error taxonomy from spec.md §7, mapped to CLI exit codes in
//! `src/bin/jlc.rs`.

use derive_more::Display;

/// A single diagnostic with source position, the `file:line:col: error:
/// message` format spec.md §7 specifies.
#[derive(Debug, Clone, Display)]
#[display("{file}:{line}:{col}: error: {message}")]
pub struct SourceError {
    pub file: String,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl SourceError {
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        SourceError {
            file: file.into(),
            line,
            col: 0,
            message: message.into(),
        }
    }
}

impl std::error::Error for SourceError {}

/// A non-fatal diagnostic (spec.md §7 `SourceWarning`): printed, but
/// compilation continues.
#[derive(Debug, Clone, Display)]
#[display("{file}:{line}: warning: {message}")]
pub struct SourceWarning {
    pub file: String,
    pub line: usize,
    pub message: String,
}

/// The top-level error type returned by [`crate::compile_str`] and mapped
/// to process exit codes by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("usage error: {0}")]
    Usage(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{} source error(s)", .0.len())]
    Source(Vec<SourceError>),
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl From<crate::front::parse::ParseError> for CompileError {
    fn from(e: crate::front::parse::ParseError) -> Self {
        CompileError::Source(vec![e.0])
    }
}
