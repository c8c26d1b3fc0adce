use thiserror::Error;

/// Boxed error raised by a plugin (source, shared state or UDF).
pub type PluginError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing field: '{0}'")]
    MissingField(String),

    #[error("Invalid type for '{field}': expected {expected}, got {actual}")]
    TypeCoercion {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Shared state '{0}' was not found")]
    StateNotFound(String),

    #[error("Shared state '{name}' cannot be converted to {expected}")]
    StateTypeMismatch { name: String, expected: String },

    #[error("Shared state '{0}' already exists")]
    StateAlreadyExists(String),

    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("'{0}' is not registered")]
    NotRegistered(String),

    #[error("'{name}' expects {expected} arguments, got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Source is not rewindable")]
    NotRewindable,

    #[error("Source has been stopped")]
    SourceStopped,

    #[error("Sink is closed")]
    SinkClosed,

    #[error(transparent)]
    Plugin(PluginError),
}

impl Error {
    /// Wraps a plugin-specific error so it can cross the host interfaces.
    pub fn plugin<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Plugin(Box::new(err))
    }

    /// Returns the plugin error of type `E` carried by this error, if any.
    pub fn downcast_plugin<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Plugin(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_sink_closed(&self) -> bool {
        matches!(self, Error::SinkClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
