use std::borrow::Cow;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoggerError {
    /// The level directive could not be parsed by `EnvFilter`.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        directive: String,
        message: Cow<'static, str>,
    },

    /// A global subscriber is already installed.
    #[error("logger already initialized: {message}")]
    AlreadyInitialized { message: Cow<'static, str> },

    /// File output configured but the `file` feature is off.
    #[error("file logging to '{directory}' requested but the `file` feature is disabled")]
    FileLoggingDisabled { directory: String },
}
