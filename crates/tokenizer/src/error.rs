use thiserror::Error;

/// Reasons a file-backed backend refuses to construct.
///
/// These never reach the caller of [`TokenizerLoader::load`](crate::TokenizerLoader::load);
/// they demote selection to the next backend.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed vocabulary source: {0}")]
    Malformed(String),

    #[error("vocabulary too small: {found} tokens, need at least {min}")]
    TooFewTokens { found: usize, min: usize },
}
