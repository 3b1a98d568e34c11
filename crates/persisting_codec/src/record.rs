//! The record: one unit of caller data.

use crate::decoder::{CanonicalDecoder, MAX_DEPTH};
use crate::encoder::{fields_len, CanonicalEncoder};
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// An ordered mapping from field name to [`Value`].
///
/// Records are schema-less: the WAL stores whatever fields the caller sends,
/// and the columnar sink infers column types per batch. Fields are kept in
/// key order so two records with the same content always encode to the
/// same bytes.
///
/// ```rust
/// use persisting_codec::{Record, Value};
///
/// let record: Record = [("id", Value::from("1")), ("n", Value::from(2))]
///     .into_iter()
///     .collect();
/// let bytes = record.encode().unwrap();
/// assert_eq!(Record::decode(&bytes).unwrap(), record);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Deepest nesting a record may hold; the record map itself is depth 0
    /// and its field values depth 1.
    ///
    /// A columnar batch stores field values three levels further down
    /// (batch, column list, column, value list), and the batch still has
    /// to decode.
    pub const MAX_DEPTH: usize = MAX_DEPTH - 3;

    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, returning the previous value if there was one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Builder-style variant of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Iterates over field names in key order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the underlying field map.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Consumes the record into a map [`Value`].
    pub fn into_value(self) -> Value {
        Value::Map(self.fields)
    }

    /// Builds a record from a map [`Value`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotARecord`] for any other value type.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Map(fields) => Ok(Self { fields }),
            other => Err(CodecError::NotARecord {
                found: other.type_name(),
            }),
        }
    }

    /// Encodes the record to deterministic canonical CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if a field holds a NaN float or nests deeper than
    /// [`Self::MAX_DEPTH`].
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut encoder = CanonicalEncoder::new().with_max_depth(Self::MAX_DEPTH);
        encoder.encode_fields(&self.fields)?;
        Ok(encoder.into_bytes())
    }

    /// Length of [`Self::encode`]'s output, computed without encoding.
    pub fn encoded_len(&self) -> usize {
        fields_len(&self.fields)
    }

    /// Checks everything [`Self::encode`] checks, without encoding.
    ///
    /// # Errors
    ///
    /// Same as [`Self::encode`].
    pub fn validate(&self) -> CodecResult<()> {
        fn check(value: &Value, depth: usize) -> CodecResult<()> {
            if depth > Record::MAX_DEPTH {
                return Err(CodecError::invalid_structure("nesting too deep"));
            }
            match value {
                Value::Float(f) if f.is_nan() => Err(CodecError::NaNForbidden),
                Value::Array(items) => items.iter().try_for_each(|v| check(v, depth + 1)),
                Value::Map(fields) => fields.values().try_for_each(|v| check(v, depth + 1)),
                _ => Ok(()),
            }
        }
        self.fields.values().try_for_each(|v| check(v, 1))
    }

    /// Decodes a record from canonical CBOR produced by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a single canonical CBOR map
    /// with text keys.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut decoder = CanonicalDecoder::new(bytes);
        let value = decoder.decode()?;
        if !decoder.is_empty() {
            return Err(CodecError::TrailingBytes {
                count: decoder.remaining().len(),
            });
        }
        Self::from_value(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
