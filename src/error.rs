//! Error types for los-libros-cfi

use thiserror::Error;

use crate::cfi::{CfiParseError, ResolveError};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed CFI: {0}")]
    MalformedCfi(#[from] CfiParseError),

    #[error("CFI does not resolve: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to load {href}: {reason}")]
    LoaderFailure { href: String, reason: String },

    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spine item not found: {0}")]
    SpineItemNotFound(String),

    #[error("Location generation cancelled")]
    Cancelled,

    #[error("Invalid package document: {0}")]
    InvalidPackage(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },
}

impl Error {
    /// Wrap a loader rejection for `href`
    pub fn loader(href: impl Into<String>, err: anyhow::Error) -> Self {
        Error::LoaderFailure {
            href: href.into(),
            reason: format!("{:#}", err),
        }
    }
}
