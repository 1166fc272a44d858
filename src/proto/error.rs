//! Wire protocol error types

use thiserror::Error;

/// Error type for encoding and decoding wire messages
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Message shorter than its fixed layout requires
    #[error("truncated message: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    /// Control message option byte is not a known command
    #[error("unknown control option {0}")]
    UnknownOption(u8),

    /// Datagram discriminator byte is not a known kind
    #[error("unknown datagram discriminator {0:#x}")]
    UnknownDiscriminator(u8),

    /// Buffer name is empty, too long, or not valid UTF-8
    #[error("invalid buffer name: {0}")]
    InvalidName(String),
}
