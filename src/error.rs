use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("no catalogue mapping for {kind} type {code}")]
    #[diagnostic(help("add the type to the mapping tables or to `asset_categories` in the config"))]
    UnmappedType { kind: &'static str, code: String },

    #[error("missing required default: {0}")]
    MissingDefault(String),

    #[error("missing config file lims-sync.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read blacklist file at {0}")]
    BlacklistRead(PathBuf),

    #[error("invalid permanent identifier: {0}")]
    InvalidPermId(String),

    #[error("source object not found in LIMS: {0}")]
    SourceNotFound(String),

    #[error("{identifier} is embedded in more than one catalogue {kind}: {}", ids.join(", "))]
    #[diagnostic(help("remove or rename the duplicates in the catalogue, then re-run"))]
    AmbiguousMatch {
        kind: String,
        identifier: String,
        ids: Vec<String>,
    },

    #[error("LIMS request failed: {0}")]
    LimsHttp(String),

    #[error("LIMS returned status {status}: {message}")]
    LimsStatus { status: u16, message: String },

    #[error("catalogue request failed: {0}")]
    CatalogueHttp(String),

    #[error("catalogue returned status {status}: {message}")]
    CatalogueStatus { status: u16, message: String },

    #[error("upload of {file} failed: {message}")]
    Upload { file: String, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl SyncError {
    /// True for errors raised before anything was written anywhere.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::UnmappedType { .. }
                | SyncError::MissingDefault(_)
                | SyncError::MissingConfig
                | SyncError::ConfigRead(_)
                | SyncError::ConfigParse(_)
                | SyncError::InvalidConfig(_)
                | SyncError::BlacklistRead(_)
        )
    }
}
