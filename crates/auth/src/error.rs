/// Why a request failed the API key gate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API key is required")]
    Missing,

    #[error("Invalid API key")]
    Invalid,

    #[error("API key has expired")]
    Expired,

    /// The key store could not be read or updated.
    #[error("api key store failed: {0}")]
    Store(#[source] anyhow::Error),
}

impl Error {
    /// Text safe to return to the caller. Store failures stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) => "Authentication failed".into(),
            other => other.to_string(),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Store(_) => "store",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
