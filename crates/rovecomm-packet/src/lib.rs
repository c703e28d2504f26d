//! Wire-format codec for RoveComm typed packets.
//!
//! Every packet is a fixed 6-byte header followed by a flat payload:
//! - A 2-byte big-endian data identifier (routing key)
//! - A 1-byte element-type tag
//! - A 1-byte pad (written as zero)
//! - A 2-byte big-endian element count
//! - `element_count * width(element_type)` payload bytes, big-endian per element
//!
//! This layout is the interoperability contract between RoveComm
//! implementations. The codec is pure: no I/O, no allocation surprises.

pub mod codec;
pub mod element;
pub mod error;

pub use codec::{
    decode_elements, decode_header, decode_packet, encode_header, encode_packet, DataId, Packet,
    PacketHeader, HEADER_SIZE,
};
pub use element::{AsciiChar, ElementType, WireElement};
pub use error::{DecodeError, Result};
