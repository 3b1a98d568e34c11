//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{cmp_canonical_keys, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Decode a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain
/// forbidden constructs, or continue past the first value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Accepts exactly what [`crate::CanonicalEncoder`] produces: shortest-form
/// lengths, text-keyed maps in canonical order, double-width floats.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Maximum element count for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum byte/string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth of arrays and maps. The outermost value is depth 0.
pub const MAX_DEPTH: usize = 128;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        self.decode_at_depth(0)
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[allow(clippy::cast_possible_wrap)]
    fn decode_at_depth(&mut self, depth: usize) -> CodecResult<Value> {
        if depth > MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }

        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::unsupported_type("unsigned integer above i64::MAX"))
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                if i64::try_from(n).is_ok() {
                    Ok(Value::Integer(-(n as i64) - 1))
                } else {
                    Err(CodecError::unsupported_type("negative integer below i64::MIN"))
                }
            }
            2 => {
                let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => self.decode_text(additional_info).map(Value::Text),
            4 => {
                let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode_at_depth(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            5 => self.decode_map(additional_info, depth),
            6 => Err(CodecError::unsupported_type("tagged value")),
            _ => self.decode_simple(additional_info),
        }
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let non_canonical =
            || CodecError::invalid_structure("non-canonical: value could be encoded in fewer bytes");

        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => {
                let byte = self.read_byte()?;
                if byte < 24 {
                    return Err(non_canonical());
                }
                Ok(u64::from(byte))
            }
            25 => {
                let bytes = self.read_bytes(2)?;
                let value = u16::from_be_bytes([bytes[0], bytes[1]]);
                if u8::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            26 => {
                let bytes = self.read_bytes(4)?;
                let value = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if u16::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            27 => {
                let bytes = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                let value = u64::from_be_bytes(raw);
                if u32::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(value)
            }
            31 => Err(CodecError::IndefiniteLengthForbidden),
            _ => Err(CodecError::invalid_structure("reserved additional info")),
        }
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(claimed as usize)
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<String> {
        let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
        let bytes = self.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_string())
    }

    fn decode_map(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut fields = BTreeMap::new();
        let mut prev_key: Option<String> = None;

        for _ in 0..len {
            let header = self.read_byte()?;
            if header >> 5 != 3 {
                return Err(CodecError::unsupported_type("non-text map key"));
            }
            let key = self.decode_text(header & 0x1f)?;

            // Strictly increasing canonical order also rules out duplicates.
            if let Some(prev) = &prev_key {
                if cmp_canonical_keys(prev, &key) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }

            let value = self.decode_at_depth(depth + 1)?;
            fields.insert(key.clone(), value);
            prev_key = Some(key);
        }

        Ok(Value::Map(fields))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats must use the 8-byte form",
            )),
            27 => {
                let bytes = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                let value = f64::from_be_bytes(raw);
                if value.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(value))
            }
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_canonical_cbor;

    #[test]
    fn decode_rejects_non_shortest_integer() {
        assert!(matches!(
            from_cbor(&[0x18, 0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn decode_rejects_unsorted_keys() {
        // {"aa": 1, "b": 2} with keys in BTreeMap order instead of canonical order
        let bytes = [0xa2, 0x62, b'a', b'a', 0x01, 0x61, b'b', 0x02];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn decode_rejects_duplicate_keys() {
        let bytes = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(from_cbor(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_integer_map_keys() {
        let bytes = [0xa1, 0x01, 0x02];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn decode_rejects_single_precision_float() {
        assert!(from_cbor(&[0xfa, 0x3f, 0xc0, 0x00, 0x00]).is_err());
    }

    #[test]
    fn decode_rejects_indefinite_length() {
        assert_eq!(
            from_cbor(&[0x9f, 0x01, 0xff]).unwrap_err(),
            CodecError::IndefiniteLengthForbidden
        );
    }

    #[test]
    fn decode_truncated_input() {
        let bytes = to_canonical_cbor(&Value::from("hello")).unwrap();
        assert_eq!(
            from_cbor(&bytes[..3]).unwrap_err(),
            CodecError::UnexpectedEof
        );
    }

    #[test]
    fn decode_rejects_huge_claimed_length() {
        // byte string claiming 2^32 bytes
        let bytes = [0x5b, 0, 0, 0, 1, 0, 0, 0, 0];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn extreme_integers_roundtrip() {
        for n in [i64::MIN, -1, 0, i64::MAX] {
            let bytes = to_canonical_cbor(&Value::Integer(n)).unwrap();
            assert_eq!(from_cbor(&bytes).unwrap(), Value::Integer(n));
        }
    }
}
