use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid locale slug: {0}")]
    InvalidLocale(String),

    #[error("failed to map language \"{0}\" into ISO 639-3")]
    UnmappedLanguage(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to parse page at {url}: {message}")]
    PageParse { url: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive container error: {0}")]
    Container(String),

    #[error(
        "stopped because the count of failed simulation downloads ({failed}) is higher than {threshold}"
    )]
    TooManyFailures { failed: usize, threshold: usize },

    #[error("catalog for language {0} is missing from the staging store")]
    MissingCatalog(String),
}

impl HarvestError {
    pub fn filesystem(err: impl std::fmt::Display) -> Self {
        HarvestError::Filesystem(err.to_string())
    }
}
