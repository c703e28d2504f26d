use std::net::SocketAddr;

use bytes::{Buf, BufMut, BytesMut};

use crate::element::{ElementType, WireElement};
use crate::error::{DecodeError, Result};

/// Packet header: data id (2) + element-type tag (1) + pad (1) + count (2).
pub const HEADER_SIZE: usize = 6;

/// Numeric key identifying a logical data stream. Assigned by the manifest;
/// the codec and transports treat the space as flat.
pub type DataId = u16;

/// The decoded fixed header of one wire packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub data_id: DataId,
    pub element_type: ElementType,
    pub element_count: u16,
}

impl PacketHeader {
    /// Length of the payload this header declares, in bytes.
    pub fn payload_len(&self) -> usize {
        self.element_count as usize * self.element_type.width()
    }
}

/// A decoded, in-memory packet with elements of concrete type `T`.
///
/// `source` is set by the receiving transport (the sending peer's address)
/// and is never transmitted on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<T: WireElement> {
    pub data_id: DataId,
    pub elements: Vec<T>,
    pub source: Option<SocketAddr>,
}

impl<T: WireElement> Packet<T> {
    /// Create a packet to send. Element counts above `u16::MAX` cannot be
    /// represented in the header and are a caller bug.
    pub fn new(data_id: DataId, elements: impl Into<Vec<T>>) -> Self {
        let elements = elements.into();
        debug_assert!(elements.len() <= u16::MAX as usize);
        Self {
            data_id,
            elements,
            source: None,
        }
    }

    /// The header this packet encodes with.
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            data_id: self.data_id,
            element_type: T::ELEMENT_TYPE,
            element_count: self.elements.len() as u16,
        }
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.elements.len() * T::ELEMENT_TYPE.width()
    }
}

/// Encode the fixed header into the wire format.
pub fn encode_header(header: &PacketHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_u16(header.data_id);
    dst.put_u8(header.element_type.tag());
    dst.put_u8(0);
    dst.put_u16(header.element_count);
}

/// Encode a complete packet: header, then each element in big-endian order.
///
/// Total length is deterministic from the element count; always succeeds for
/// a well-formed packet.
pub fn encode_packet<T: WireElement>(packet: &Packet<T>, dst: &mut BytesMut) {
    dst.reserve(packet.wire_size());
    encode_header(&packet.header(), dst);
    for element in &packet.elements {
        element.put(dst);
    }
}

/// Decode the fixed header from the front of `src`.
pub fn decode_header(src: &[u8]) -> Result<PacketHeader> {
    if src.len() < HEADER_SIZE {
        return Err(DecodeError::TruncatedHeader { len: src.len() });
    }

    let mut buf = src;
    let data_id = buf.get_u16();
    let tag = buf.get_u8();
    let _pad = buf.get_u8();
    let element_count = buf.get_u16();

    Ok(PacketHeader {
        data_id,
        element_type: ElementType::from_tag(tag)?,
        element_count,
    })
}

/// Decode the payload declared by `header` as elements of type `T`.
///
/// Trailing bytes beyond the declared payload are ignored; what to do with
/// them is the transport's concern.
pub fn decode_elements<T: WireElement>(header: &PacketHeader, payload: &[u8]) -> Result<Vec<T>> {
    if header.element_type != T::ELEMENT_TYPE {
        return Err(DecodeError::TypeMismatch {
            requested: T::ELEMENT_TYPE,
            wire: header.element_type,
        });
    }

    let expected = header.payload_len();
    if payload.len() < expected {
        return Err(DecodeError::PayloadLengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut buf = &payload[..expected];
    let mut elements = Vec::with_capacity(header.element_count as usize);
    for _ in 0..header.element_count {
        elements.push(T::get(&mut buf));
    }
    Ok(elements)
}

/// Decode a complete packet (header + payload) from `src`.
pub fn decode_packet<T: WireElement>(src: &[u8]) -> Result<Packet<T>> {
    let header = decode_header(src)?;
    let elements = decode_elements(&header, &src[HEADER_SIZE..])?;
    Ok(Packet {
        data_id: header.data_id,
        elements,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::AsciiChar;

    fn roundtrip<T: WireElement>(data_id: DataId, elements: Vec<T>) {
        let packet = Packet::new(data_id, elements);
        let mut wire = BytesMut::new();
        encode_packet(&packet, &mut wire);
        assert_eq!(wire.len(), packet.wire_size());

        let decoded = decode_packet::<T>(&wire).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn roundtrip_every_type_and_count() {
        roundtrip::<i8>(1, vec![]);
        roundtrip::<i8>(1, vec![-128]);
        roundtrip::<i8>(1, (0..500).map(|i| (i % 127) as i8).collect());

        roundtrip::<u8>(2, vec![]);
        roundtrip::<u8>(2, vec![255]);
        roundtrip::<u8>(2, vec![0xAB; 4096]);

        roundtrip::<i16>(3, vec![i16::MIN, -1, 0, 1, i16::MAX]);
        roundtrip::<u16>(4, vec![0, u16::MAX]);
        roundtrip::<i32>(5, vec![i32::MIN, i32::MAX]);
        roundtrip::<u32>(6, vec![]);
        roundtrip::<u32>(6, (0..1000).collect());
        roundtrip::<i64>(7, vec![i64::MIN, i64::MAX]);
        roundtrip::<u64>(8, vec![u64::MAX]);

        roundtrip::<f32>(9, vec![0.0, -1.5, f32::MAX, f32::MIN_POSITIVE]);
        roundtrip::<f64>(10, vec![std::f64::consts::PI, f64::NEG_INFINITY]);

        roundtrip::<AsciiChar>(11, b"rovecomm".iter().copied().map(AsciiChar).collect());
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let packet = Packet::<u32>::new(0x0102, vec![7, 8]);
        let mut wire = BytesMut::new();
        encode_packet(&packet, &mut wire);

        // id (BE) | tag | pad | count (BE) | elements (BE)
        assert_eq!(
            wire.as_ref(),
            &[
                0x01, 0x02, // data id
                0x05, // uint32 tag
                0x00, // pad
                0x00, 0x02, // element count
                0x00, 0x00, 0x00, 0x07, // 7
                0x00, 0x00, 0x00, 0x08, // 8
            ]
        );
    }

    #[test]
    fn truncated_header_for_every_short_length() {
        let wire = {
            let mut buf = BytesMut::new();
            encode_packet(&Packet::<u16>::new(5, vec![1, 2]), &mut buf);
            buf
        };

        for len in 0..HEADER_SIZE {
            let err = decode_header(&wire[..len]).unwrap_err();
            assert!(matches!(err, DecodeError::TruncatedHeader { len: l } if l == len));
        }
    }

    #[test]
    fn payload_shorter_than_declared_is_mismatch() {
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u32>::new(9, vec![1, 2, 3]), &mut wire);

        let err = decode_packet::<u32>(&wire[..wire.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::PayloadLengthMismatch {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn wrong_requested_type_is_mismatch() {
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u32>::new(9, vec![1]), &mut wire);

        let err = decode_packet::<i16>(&wire).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TypeMismatch {
                requested: ElementType::Int16,
                wire: ElementType::Uint32
            }
        ));
    }

    #[test]
    fn unknown_tag_in_header_rejected() {
        let wire = [0x00, 0x09, 0xFE, 0x00, 0x00, 0x01, 0x00];
        let err = decode_header(&wire).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownElementType(0xFE)));
    }

    #[test]
    fn surplus_trailing_bytes_ignored() {
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u16>::new(3, vec![42]), &mut wire);
        wire.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let decoded = decode_packet::<u16>(&wire).unwrap();
        assert_eq!(decoded.data_id, 3);
        assert_eq!(decoded.elements, vec![42]);
    }

    #[test]
    fn pad_byte_ignored_on_decode() {
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u8>::new(1, vec![9]), &mut wire);
        wire[3] = 0x5A;

        let decoded = decode_packet::<u8>(&wire).unwrap();
        assert_eq!(decoded.elements, vec![9]);
    }

    #[test]
    fn zero_element_packet_is_header_only() {
        let packet = Packet::<f64>::new(77, vec![]);
        assert_eq!(packet.wire_size(), HEADER_SIZE);

        let mut wire = BytesMut::new();
        encode_packet(&packet, &mut wire);
        assert_eq!(wire.len(), HEADER_SIZE);

        let decoded = decode_packet::<f64>(&wire).unwrap();
        assert!(decoded.elements.is_empty());
        assert_eq!(decoded.data_id, 77);
    }

    #[test]
    fn decode_elements_reports_header_not_buffer() {
        // A header declaring zero elements decodes from an empty payload even
        // when the requested type is wider than the buffer.
        let header = PacketHeader {
            data_id: 1,
            element_type: ElementType::Double,
            element_count: 0,
        };
        let elements = decode_elements::<f64>(&header, &[]).unwrap();
        assert!(elements.is_empty());
    }
}
