use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum OwidError {
    #[error("invalid dataset slug: {0}")]
    InvalidSlug(String),

    #[error("invalid dataset descriptor {slug}: {message}")]
    InvalidDescriptor { slug: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("[{slug}] {stage} request failed: {message}")]
    #[diagnostic(help("check network connectivity and the dataset slug"))]
    Http {
        slug: String,
        stage: Stage,
        message: String,
    },

    #[error("[{slug}] {stage} request returned status {status}: {message}")]
    Status {
        slug: String,
        stage: Stage,
        status: u16,
        message: String,
    },

    #[error("[{slug}] {stage} failed: {message}")]
    Parse {
        slug: String,
        stage: Stage,
        message: String,
    },

    #[error("[{slug}] project failed: column `{column}` missing from response")]
    #[diagnostic(help("the grapher may have renamed this indicator; update the catalog"))]
    MissingColumn { slug: String, column: String },

    #[error("[{slug}] rename failed: target column `{column}` already exists")]
    RenameCollision { slug: String, column: String },

    #[error("cannot join tables: column `{0}` present on both sides")]
    DuplicateColumn(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl OwidError {
    /// Slug of the dataset the error originated from, when there is one.
    pub fn slug(&self) -> Option<&str> {
        match self {
            OwidError::InvalidDescriptor { slug, .. }
            | OwidError::Http { slug, .. }
            | OwidError::Status { slug, .. }
            | OwidError::Parse { slug, .. }
            | OwidError::MissingColumn { slug, .. }
            | OwidError::RenameCollision { slug, .. } => Some(slug),
            _ => None,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        matches!(self, OwidError::Http { .. } | OwidError::Status { .. })
    }
}
