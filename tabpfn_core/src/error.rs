use std::sync::Arc;

/// Result type used throughout the TabPFN utility crates.
///
/// Note that most telemetry operations deliberately do *not* return this
/// type: transient infrastructure failures (network, filesystem) are
/// swallowed close to where they happen, because telemetry must never
/// affect the host application. [`Error`] is reserved for the seams where
/// an error is actionable—misuse of the environment store, or a rejected
/// newsletter subscription.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the TabPFN utility crates.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The process environment store was accessed before initialization.
    ///
    /// This is a programmer error and is raised loudly instead of being
    /// swallowed like the transient failure classes.
    #[error("environment has not been initialized")]
    EnvironmentUninitialized,

    /// The process environment store was initialized twice with
    /// conflicting modes.
    #[error("environment of mode {current} already exists, cannot re-initialize as {requested}")]
    EnvironmentModeMismatch {
        /// Mode the environment was initialized with.
        current: String,
        /// Mode of the rejected `init` call.
        requested: String,
    },

    /// The newsletter subscription endpoint returned a non-200 response.
    #[error("newsletter subscription rejected (status {0})")]
    SubscriptionRejected(reqwest::StatusCode),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A JSON serialization error.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
