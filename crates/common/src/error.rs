//! Error types for storyrun

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using storyrun Error
pub type Result<T> = std::result::Result<T, Error>;

/// storyrun error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The catalog configuration could not be located or read. Nothing can
    /// be discovered without it, so callers treat this as fatal.
    #[error(
        "Could not load the catalog configuration in {}: {reason}. Is the config directory correct? \
         You can change it with --catalog-config-dir <path-to-dir>",
        dir.display()
    )]
    ConfigResolution { dir: PathBuf, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid stories pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the process should stop instead of skipping the current item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigResolution { .. } | Error::InvalidPattern { .. })
    }
}

/// A story file that could not be parsed.
#[derive(Error, Debug)]
#[error("The \"{}\" story contains syntax errors: {cause}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    #[source]
    pub cause: ParseCause,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, cause: ParseCause) -> Self {
        Self {
            path: path.into(),
            cause,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseCause {
    #[error("unexpected syntax at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing default export")]
    MissingDefaultExport,

    #[error("default export `{0}` does not resolve to an object literal")]
    Unresolved(String),

    #[error("could not resolve a title; add `title` to the default export")]
    MissingTitle,

    #[error("grammar error: {0}")]
    Grammar(String),

    #[error("story id `{id}` is already declared in {}", first.display())]
    DuplicateId { id: String, first: PathBuf },
}
