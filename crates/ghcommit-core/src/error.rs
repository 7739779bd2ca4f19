use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to read {path}: {source}")]
    LocalRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("no files to commit")]
    NoFiles,

    #[error("duplicate path in file list: {0}")]
    DuplicatePath(String),

    #[error("invalid file list: {0}")]
    InvalidFileList(String),

    #[error("invalid repository '{0}', expected owner/name")]
    InvalidRepository(String),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("{0} must be set")]
    MissingConfig(String),
}

impl From<reqwest::Error> for CommitError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CommitError::Decode(err.to_string())
        } else {
            CommitError::Transport(err.to_string())
        }
    }
}
