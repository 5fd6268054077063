use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The decoded variable tree does not have the expected shape.
    #[error("structure mismatch: {0}")]
    StructureMismatch(String),

    /// Malformed, truncated or unsupported save data.
    #[error("decode failure: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Error::StructureMismatch(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
