pub type GrayfadeResult<T> = Result<T, GrayfadeError>;

/// Failure categories of a grayfade run.
///
/// Every category except [`GrayfadeError::Encode`] is fatal to the whole run; encode failures are
/// subject to [`EncodeErrorPolicy`](crate::EncodeErrorPolicy).
#[derive(thiserror::Error, Debug)]
pub enum GrayfadeError {
    /// Bad options, or a worker count incompatible with the image height.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source image is missing or unreadable.
    #[error("decode error: {0}")]
    Decode(String),

    /// A broadcast or gather did not complete, or participants disagreed on sizes.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A frame could not be written.
    #[error("encode error: {0}")]
    Encode(String),

    /// A kernel was called with rows or buffers outside its contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GrayfadeError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
