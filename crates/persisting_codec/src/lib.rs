//! # Persisting Codec
//!
//! Record model and deterministic CBOR encoding for the persisting WAL.
//!
//! A [`Record`] is an ordered, schema-less mapping from field name to
//! [`Value`]. Records are serialized once, when they enter the WAL, with a
//! canonical CBOR encoding:
//! - identical records produce identical bytes
//! - map keys are sorted (length-first, then bytewise)
//! - integers and lengths use the shortest encoding
//! - floats use the 8-byte form; NaN is rejected
//! - no indefinite-length items, no tags
//!
//! ## Usage
//!
//! ```
//! use persisting_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::map([("id", Value::from("1"))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod record;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_DEPTH};
pub use encoder::{encoded_len, fields_len, to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use value::Value;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl Encode for Record {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        Record::encode(self)
    }
}

impl Decode for Record {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Record::decode(bytes)
    }
}
