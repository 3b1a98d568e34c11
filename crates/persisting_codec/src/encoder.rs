//! Canonical CBOR encoder.

use crate::decoder::MAX_DEPTH;
use crate::error::{CodecError, CodecResult};
use crate::value::{cmp_canonical_keys, Value};
use std::collections::BTreeMap;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic, following RFC 8949 Section 4.2.1:
/// - map keys are sorted by their encoded form (length-first, then bytewise)
/// - integers and lengths use the shortest possible encoding
/// - no indefinite-length items
///
/// Floats always use the 8-byte form so a value never changes width
/// depending on whether it happens to fit a narrower float.
///
/// # Errors
///
/// Returns [`CodecError::NaNForbidden`] if the value contains a NaN, or
/// [`CodecError::InvalidStructure`] if it nests deeper than the decoder
/// accepts.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Length of the canonical encoding of `value`, computed without encoding.
///
/// Ignores the depth limit and NaN check; for a value that encodes, this is
/// exactly the length [`to_canonical_cbor`] returns.
#[allow(clippy::cast_sign_loss)]
pub fn encoded_len(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 1,
        Value::Integer(n) if *n >= 0 => head_len(*n as u64),
        Value::Integer(n) => head_len((-(n + 1)) as u64),
        Value::Float(_) => 9,
        Value::Bytes(b) => head_len(b.len() as u64) + b.len(),
        Value::Text(s) => head_len(s.len() as u64) + s.len(),
        Value::Array(items) => {
            head_len(items.len() as u64) + items.iter().map(encoded_len).sum::<usize>()
        }
        Value::Map(fields) => fields_len(fields),
    }
}

/// Length of the canonical encoding of a text-keyed map.
pub fn fields_len(fields: &BTreeMap<String, Value>) -> usize {
    head_len(fields.len() as u64)
        + fields
            .iter()
            .map(|(k, v)| head_len(k.len() as u64) + k.len() + encoded_len(v))
            .sum::<usize>()
}

fn head_len(value: u64) -> usize {
    if value < 24 {
        1
    } else if value <= u64::from(u8::MAX) {
        2
    } else if value <= u64::from(u16::MAX) {
        3
    } else if value <= u64::from(u32::MAX) {
        5
    } else {
        9
    }
}

/// A canonical CBOR encoder.
///
/// Refuses to nest deeper than its depth limit, which defaults to what
/// [`crate::CanonicalDecoder`] accepts, so everything encoded decodes.
#[derive(Debug)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
    max_depth: usize,
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            max_depth: MAX_DEPTH,
        }
    }
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Lowers the nesting limit. Values at a depth above `max_depth` are
    /// refused; the outermost value is depth 0.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_DEPTH);
        self
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        self.encode_at_depth(value, 0)
    }

    /// Encode a text-keyed map in canonical key order.
    pub fn encode_fields(&mut self, fields: &BTreeMap<String, Value>) -> CodecResult<()> {
        self.encode_fields_at_depth(fields, 0)
    }

    fn encode_at_depth(&mut self, value: &Value, depth: usize) -> CodecResult<()> {
        if depth > self.max_depth {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Bytes(b) => self.encode_bytes(b),
            Value::Text(s) => self.encode_text(s),
            Value::Array(items) => {
                self.encode_unsigned(4, items.len() as u64);
                for item in items {
                    self.encode_at_depth(item, depth + 1)?;
                }
            }
            Value::Map(fields) => self.encode_fields_at_depth(fields, depth)?,
        }
        Ok(())
    }

    fn encode_fields_at_depth(
        &mut self,
        fields: &BTreeMap<String, Value>,
        depth: usize,
    ) -> CodecResult<()> {
        if depth > self.max_depth {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
        entries.sort_by(|a, b| cmp_canonical_keys(a.0, b.0));

        self.encode_unsigned(5, entries.len() as u64);
        for (key, value) in entries {
            self.encode_text(key);
            self.encode_at_depth(value, depth + 1)?;
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // CBOR negative integers carry -(n+1), which fits u64 for every i64.
            self.encode_unsigned(1, (-(n + 1)) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if f.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&f.to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_bytes(&mut self, bytes: &[u8]) {
        self.encode_unsigned(2, bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    fn encode_text(&mut self, text: &str) {
        self.encode_unsigned(3, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }
}
