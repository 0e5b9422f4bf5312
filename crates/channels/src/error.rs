use std::error::Error as StdError;

/// Crate-wide result type for plugin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by plugins, the registry and the config model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid plugin input: {message}")]
    InvalidInput { message: String },

    /// The platform name is not a known platform or a valid custom identifier.
    #[error("invalid platform: {name}")]
    InvalidPlatform { name: String },

    /// A requested plugin ID is not registered.
    #[error("unknown plugin: {plugin_id}")]
    UnknownPlugin { plugin_id: String },

    /// Wrapped source error from an external dependency.
    #[error("plugin operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_platform(name: impl Into<String>) -> Self {
        Self::InvalidPlatform { name: name.into() }
    }

    #[must_use]
    pub fn unknown_plugin(plugin_id: impl std::fmt::Display) -> Self {
        Self::UnknownPlugin {
            plugin_id: plugin_id.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl hookgate_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::InvalidInput { message }
    }
}

hookgate_common::impl_context!();
