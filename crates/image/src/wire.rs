//! Minimal protobuf wire walking over raw descriptor bytes.
//!
//! Decoding into `prost_types` drops fields the generated types do not know,
//! custom options included. Anything that must keep those bytes intact
//! (image encoding, option stripping, byte-level comparisons) works on the
//! raw encoding through these helpers instead.

use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};
use prost::DecodeError;

/// One top-level field of an encoded message.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Field<'a> {
    pub number: u32,
    pub wire_type: WireType,
    /// Key and payload exactly as encoded.
    pub raw: &'a [u8],
    /// Content of a length-delimited field, or the value bytes otherwise.
    pub payload: &'a [u8],
}

impl Field<'_> {
    pub fn varint(&self) -> Option<u64> {
        if self.wire_type != WireType::Varint {
            return None;
        }
        let mut buf = self.payload;
        decode_varint(&mut buf).ok()
    }

    pub fn string(&self) -> Option<&str> {
        if self.wire_type != WireType::LengthDelimited {
            return None;
        }
        std::str::from_utf8(self.payload).ok()
    }
}

pub(crate) fn parse_fields(data: &[u8]) -> Result<Vec<Field<'_>>, DecodeError> {
    let mut fields = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let start = data.len() - rest.len();
        let (number, wire_type) = decode_key(&mut rest)?;
        let payload_start = data.len() - rest.len();
        let payload = match wire_type {
            WireType::Varint => {
                decode_varint(&mut rest)?;
                &data[payload_start..data.len() - rest.len()]
            }
            WireType::SixtyFourBit => take(&mut rest, 8)?,
            WireType::ThirtyTwoBit => take(&mut rest, 4)?,
            WireType::LengthDelimited => {
                let len = usize::try_from(decode_varint(&mut rest)?)
                    .map_err(|_| DecodeError::new("length overflows usize"))?;
                take(&mut rest, len)?
            }
            WireType::StartGroup => {
                skip_group(&mut rest, number)?;
                &data[payload_start..data.len() - rest.len()]
            }
            WireType::EndGroup => return Err(DecodeError::new("unexpected end group")),
        };
        fields.push(Field {
            number,
            wire_type,
            raw: &data[start..data.len() - rest.len()],
            payload,
        });
    }
    Ok(fields)
}

fn take<'a>(rest: &mut &'a [u8], len: usize) -> Result<&'a [u8], DecodeError> {
    if rest.len() < len {
        return Err(DecodeError::new("buffer underflow"));
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head)
}

fn skip_group(rest: &mut &[u8], group_number: u32) -> Result<(), DecodeError> {
    loop {
        if rest.is_empty() {
            return Err(DecodeError::new("unterminated group"));
        }
        let (number, wire_type) = decode_key(rest)?;
        match wire_type {
            WireType::Varint => {
                decode_varint(rest)?;
            }
            WireType::SixtyFourBit => {
                take(rest, 8)?;
            }
            WireType::ThirtyTwoBit => {
                take(rest, 4)?;
            }
            WireType::LengthDelimited => {
                let len = usize::try_from(decode_varint(rest)?)
                    .map_err(|_| DecodeError::new("length overflows usize"))?;
                take(rest, len)?;
            }
            WireType::StartGroup => skip_group(rest, number)?,
            WireType::EndGroup if number == group_number => return Ok(()),
            WireType::EndGroup => return Err(DecodeError::new("mismatched end group")),
        }
    }
}

pub(crate) fn encode_bytes_field(number: u32, payload: &[u8], out: &mut Vec<u8>) {
    encode_key(number, WireType::LengthDelimited, out);
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

/// Copy `data`, replacing the payload of length-delimited fields for which
/// `rewrite` returns `Some` and dropping fields for which `keep` is false.
pub(crate) fn rewrite_fields(
    data: &[u8],
    keep: &dyn Fn(&Field<'_>) -> bool,
    rewrite: &mut dyn FnMut(&Field<'_>) -> Result<Option<Vec<u8>>, DecodeError>,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len());
    for field in parse_fields(data)? {
        if !keep(&field) {
            continue;
        }
        if field.wire_type == WireType::LengthDelimited {
            if let Some(payload) = rewrite(&field)? {
                encode_bytes_field(field.number, &payload, &mut out);
                continue;
            }
        }
        out.extend_from_slice(field.raw);
    }
    Ok(out)
}
