use thiserror::Error;

/// Failures while mapping a conflict onto the rendered diff. These are reported next to
/// the conflict entry and never tear down the view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no valid location for the {endpoint}: file is unknown and there is no call stack")]
    InvalidStackTrace { endpoint: String },

    #[error("diff not found for file {file}")]
    DiffNotFound { file: String },

    #[error("line {line} not found in file {file}")]
    LineNotFound { file: String, line: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unsupported conflict kind {0:?}")]
    UnknownKind(String),

    #[error("{kind} record has {len} interference nodes")]
    ShortChain { kind: String, len: usize },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A pull request could not be identified from user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("{0:?} is not a pull request; expected owner/repo#N or https://github.com/owner/repo/pull/N")]
    InvalidPullRequest(String),
}
