use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required credential `{0}`")]
    MissingCredential(&'static str),

    #[error("failed to parse credentials file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("query failed `{query}`: {source}")]
    Query {
        query: String,
        #[source]
        source: BoxError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the configuration-error class: malformed or incomplete
    /// credentials and invalid table names.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ExtractError::Config(_) | ExtractError::MissingCredential(_) | ExtractError::Yaml { .. }
        )
    }
}
