//! Crate-level error type

use crate::proto::ProtoError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Server ID outside `0..MAX_SERVERS`
    #[error("invalid server ID {0}")]
    InvalidServerId(u8),

    /// Client ID outside `0..MAX_CLIENTS`
    #[error("invalid client ID {0}")]
    InvalidClientId(u8),

    /// Buffer name empty or longer than the wire format allows
    #[error("invalid buffer name: {0}")]
    InvalidName(String),

    /// Buffer size zero or above the per-buffer maximum
    #[error("invalid buffer size {0}")]
    InvalidSize(u16),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
