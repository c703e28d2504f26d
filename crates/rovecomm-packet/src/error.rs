use crate::element::ElementType;

/// Errors that can occur while decoding a packet from wire bytes.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the fixed header width were available.
    #[error("truncated packet header ({len} of 6 bytes)")]
    TruncatedHeader { len: usize },

    /// The payload is shorter than the header declares.
    #[error("payload length mismatch (expected {expected} bytes, have {actual})")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    /// The header's element type does not match the requested Rust type.
    #[error("element type mismatch (requested {requested:?}, wire has {wire:?})")]
    TypeMismatch {
        requested: ElementType,
        wire: ElementType,
    },

    /// The header carries an element-type tag this implementation does not know.
    #[error("unknown element type tag {0:#04x}")]
    UnknownElementType(u8),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
