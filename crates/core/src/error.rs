use crate::signal::SignalId;

/// Result alias that carries the custom [`LooperError`] type.
pub type Result<T> = std::result::Result<T, LooperError>;

/// Common error type for the core crate.
///
/// Every failure is local and synchronous: the core performs no I/O on the
/// tick path, so nothing here is transient or retried.
#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    /// A signal with the same name is already registered.
    #[error("signal `{name}` already exists")]
    DuplicateName { name: String },
    /// A zero-width range was used as the source of a linear remap.
    #[error("degenerate range [{min}, {max}] cannot be used for remapping")]
    DegenerateRange { min: f32, max: f32 },
    /// A loop could not be built from the provided configuration.
    #[error("invalid loop construction: {0}")]
    InvalidConstruction(String),
    #[error("unknown signal handle {0:?}")]
    UnknownSignal(SignalId),
    #[error("unknown signal `{0}`")]
    UnknownSignalName(String),
    #[error("unknown loop `{0}`")]
    UnknownLoop(String),
    /// Routes always run from an OUT signal to an IN signal.
    #[error("cannot route `{from}` to `{to}`: routes must run from an output to an input")]
    DirectionMismatch { from: String, to: String },
    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f32, max: f32 },
    #[error("non-finite value {value} written to `{signal}`")]
    NonFiniteValue { signal: String, value: f32 },
    #[error("signal registry has been shut down")]
    RegistryShutdown,
    /// Malformed session configuration.
    #[error("{0}")]
    Config(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl LooperError {
    /// Creates a construction error from any message.
    pub fn construction<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConstruction(msg.into())
    }
}
