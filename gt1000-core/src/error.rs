use thiserror::Error;

/// Every way the protocol engine can fail to talk to a device.
///
/// The core never panics on device misbehaviour; callers match on kind
/// and decide whether to retry, surface, or ignore.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown schema name: {0}")]
    SchemaMissing(String),

    #[error("value {value} out of range [{lo},{hi}] for {field}")]
    ValueOutOfRange {
        field: String,
        value: i64,
        lo: i64,
        hi: i64,
    },

    #[error("no MIDI port found matching prefix {0:?}")]
    PortNotFound(String),

    #[error("failed to open MIDI port: {0}")]
    PortOpenFailed(String),

    #[error("failed to write to MIDI port: {0}")]
    WriteFailed(String),

    #[error("handshake failed at state {0:?}")]
    HandshakeFailed(crate::handshake::HandshakeState),

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("malformed schema bundle: {0}")]
    InvalidSchema(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::PortOpenFailed(e.to_string())
    }
}

impl<T> From<midir::ConnectError<T>> for Error {
    fn from(e: midir::ConnectError<T>) -> Self {
        Error::PortOpenFailed(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::WriteFailed(e.to_string())
    }
}
