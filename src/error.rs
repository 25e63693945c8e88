use crate::token::VerificationError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed (status {status:?}): {detail}")]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("Token verification error: {0}")]
    Token(#[from] VerificationError),

    #[error("Configuration error: {0}")]
    Config(String),
}
