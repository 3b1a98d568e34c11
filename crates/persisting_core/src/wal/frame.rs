//! Frame envelope: `| length (4) | crc32 (4) | payload (length) |`.
//!
//! Both integers are little-endian. The checksum is CRC32 (IEEE) over the
//! payload only. The same envelope carries WAL records and columnar sink
//! batches.

use crate::error::{CoreError, CoreResult};
use bytes::{Buf, BufMut, BytesMut};

/// Header size: length (4) + crc32 (4).
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload a frame may carry.
///
/// A header declaring more than this is treated as garbage: the length
/// cannot be trusted to find the next frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Computes the CRC32 checksum of a payload.
#[inline]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Appends one framed payload to `buf`.
///
/// # Errors
///
/// Returns an error if the payload exceeds [`MAX_FRAME_LEN`].
pub fn frame_into(buf: &mut BytesMut, payload: &[u8]) -> CoreResult<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(CoreError::invalid_operation(format!(
            "payload of {} bytes exceeds the {MAX_FRAME_LEN} byte frame limit",
            payload.len()
        )));
    }
    buf.reserve(FRAME_HEADER_LEN + payload.len());
    // Bounded by MAX_FRAME_LEN above.
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(checksum(payload));
    buf.put_slice(payload);
    Ok(())
}

/// Frames a single payload.
///
/// # Errors
///
/// Returns an error if the payload exceeds [`MAX_FRAME_LEN`].
pub fn frame(payload: &[u8]) -> CoreResult<BytesMut> {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame_into(&mut buf, payload)?;
    Ok(buf)
}

/// Why a frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    /// The payload does not match its checksum.
    ChecksumMismatch {
        /// Checksum stored in the header.
        expected: u32,
        /// Checksum of the bytes on disk.
        actual: u32,
    },
    /// The declared length is larger than any frame ever written.
    ImplausibleLength {
        /// The declared payload length.
        declared: u32,
    },
}

/// Result of reading one frame from the front of a byte slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unframed<'a> {
    /// A complete frame with a valid checksum.
    Frame {
        /// The payload bytes.
        payload: &'a [u8],
        /// Total bytes the frame occupies, header included.
        frame_len: usize,
    },
    /// Not enough bytes for a full frame: either a clean end or a
    /// partially written tail.
    EndOfStream,
    /// The frame is damaged.
    Corrupt {
        /// The damage found.
        fault: FrameFault,
        /// Bytes to skip to reach the next frame, when they can be trusted.
        extent: Option<usize>,
    },
}

/// Reads one frame from the front of `bytes`.
pub fn unframe(bytes: &[u8]) -> Unframed<'_> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Unframed::EndOfStream;
    }

    let mut header = &bytes[..FRAME_HEADER_LEN];
    let declared = header.get_u32_le();
    let expected = header.get_u32_le();

    let len = declared as usize;
    if len > MAX_FRAME_LEN {
        return Unframed::Corrupt {
            fault: FrameFault::ImplausibleLength { declared },
            extent: None,
        };
    }

    let frame_len = FRAME_HEADER_LEN + len;
    if bytes.len() < frame_len {
        return Unframed::EndOfStream;
    }

    let payload = &bytes[FRAME_HEADER_LEN..frame_len];
    let actual = checksum(payload);
    if actual != expected {
        return Unframed::Corrupt {
            fault: FrameFault::ChecksumMismatch { expected, actual },
            extent: Some(frame_len),
        };
    }

    Unframed::Frame { payload, frame_len }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persisting_codec::Record;
    use proptest::prelude::*;

    #[test]
    fn header_layout() {
        let framed = frame(b"abc").unwrap();
        assert_eq!(framed.len(), FRAME_HEADER_LEN + 3);
        assert_eq!(&framed[0..4], &3u32.to_le_bytes());
        assert_eq!(&framed[4..8], &checksum(b"abc").to_le_bytes());
        assert_eq!(&framed[8..], b"abc");
    }

    #[test]
    fn empty_payload_is_a_valid_frame() {
        let framed = frame(b"").unwrap();
        assert_eq!(
            unframe(&framed),
            Unframed::Frame {
                payload: b"",
                frame_len: FRAME_HEADER_LEN
            }
        );
    }

    #[test]
    fn short_input_is_end_of_stream() {
        let framed = frame(b"hello").unwrap();
        assert_eq!(unframe(&framed[..4]), Unframed::EndOfStream);
        assert_eq!(unframe(&framed[..10]), Unframed::EndOfStream);
        assert_eq!(unframe(&[]), Unframed::EndOfStream);
    }

    #[test]
    fn flipped_payload_bit_is_corrupt_with_extent() {
        let mut framed = frame(b"hello").unwrap();
        framed[9] ^= 0x01;
        match unframe(&framed) {
            Unframed::Corrupt {
                fault: FrameFault::ChecksumMismatch { .. },
                extent,
            } => assert_eq!(extent, Some(13)),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn huge_length_is_unreadable() {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0];
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            unframe(&bytes),
            Unframed::Corrupt {
                fault: FrameFault::ImplausibleLength { .. },
                extent: None
            }
        ));
    }

    #[test]
    fn oversized_payload_is_refused() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(frame(&payload).is_err());
    }

    proptest! {
        #[test]
        fn record_survives_framing(
            fields in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let record: Record = fields.into_iter().collect();
            let framed = frame(&record.encode().unwrap()).unwrap();
            match unframe(&framed) {
                Unframed::Frame { payload, frame_len } => {
                    prop_assert_eq!(frame_len, framed.len());
                    prop_assert_eq!(Record::decode(payload).unwrap(), record);
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
