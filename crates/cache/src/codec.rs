//! Payload encoding for cache entries.
//!
//! Every stored payload is one tag byte followed by a body:
//!
//! | Tag | Body |
//! |-----|------|
//! | `0x00` | JSON |
//! | `0x01` | gzip-compressed JSON |
//!
//! Payloads are compressed when their JSON form reaches the configured
//! threshold, unless the caller opts out (or in) with [`Compress`].

use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Tag of an uncompressed JSON body.
pub const TAG_PLAIN: u8 = 0x00;

/// Tag of a gzip-compressed JSON body.
pub const TAG_GZIP: u8 = 0x01;

/// Largest decompressed body accepted (16 MiB).
pub const MAX_DECODED_LEN: u64 = 16 * 1024 * 1024;

/// Compression choice for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compress {
    /// Compress when the JSON body reaches the threshold.
    #[default]
    Auto,
    /// Never compress.
    Never,
    /// Always compress.
    Always,
}

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The value could not be serialized to JSON.
    #[error("failed to serialize cache payload: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The body is not JSON of the expected shape.
    #[error("failed to deserialize cache payload: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// gzip compression or decompression failed.
    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    /// The stored payload is empty, so it carries no tag.
    #[error("cache payload is empty")]
    Empty,

    /// The tag byte is not one this codec writes.
    #[error("unknown cache payload tag {0:#04x}")]
    UnknownTag(u8),

    /// The decompressed body exceeds [`MAX_DECODED_LEN`].
    #[error("decompressed cache payload exceeds {MAX_DECODED_LEN} bytes")]
    TooLarge,
}

/// An encoded payload ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Tag byte followed by the body.
    pub bytes: Vec<u8>,
    /// Whether the body is compressed.
    pub compressed: bool,
}

/// Serializes `value` and compresses it according to `mode`.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if the value cannot be represented as
/// JSON, or [`CodecError::Gzip`] if compression fails.
pub fn encode<T: Serialize + ?Sized>(
    value: &T,
    threshold: usize,
    mode: Compress,
) -> Result<Encoded, CodecError> {
    let json = serde_json::to_vec(value).map_err(CodecError::Serialize)?;

    let compress = match mode {
        Compress::Auto => json.len() >= threshold,
        Compress::Never => false,
        Compress::Always => true,
    };

    if !compress {
        let mut bytes = Vec::with_capacity(json.len() + 1);
        bytes.push(TAG_PLAIN);
        bytes.extend_from_slice(&json);
        return Ok(Encoded { bytes, compressed: false });
    }

    let mut encoder = GzEncoder::new(vec![TAG_GZIP], Compression::default());
    encoder.write_all(&json)?;
    let bytes = encoder.finish()?;
    Ok(Encoded { bytes, compressed: true })
}

/// Decodes a payload written by [`encode`].
///
/// # Errors
///
/// Returns an error for empty payloads, unknown tags, corrupt gzip streams,
/// oversized bodies, and JSON that does not deserialize into `T`.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    let (&tag, body) = payload.split_first().ok_or(CodecError::Empty)?;
    match tag {
        TAG_PLAIN => serde_json::from_slice(body).map_err(CodecError::Deserialize),
        TAG_GZIP => {
            let mut json = Vec::new();
            GzDecoder::new(body).take(MAX_DECODED_LEN + 1).read_to_end(&mut json)?;
            if json.len() as u64 > MAX_DECODED_LEN {
                return Err(CodecError::TooLarge);
            }
            serde_json::from_slice(&json).map_err(CodecError::Deserialize)
        },
        other => Err(CodecError::UnknownTag(other)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Verdict {
        owner: bool,
        note: String,
    }

    fn verdict(note_len: usize) -> Verdict {
        Verdict { owner: true, note: "n".repeat(note_len) }
    }

    #[test]
    fn test_small_payload_stays_plain() {
        let encoded = encode(&verdict(4), 1024, Compress::Auto).unwrap();

        assert!(!encoded.compressed);
        assert_eq!(encoded.bytes[0], TAG_PLAIN);
        assert_eq!(&encoded.bytes[1..], br#"{"owner":true,"note":"nnnn"}"#);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let json_len = serde_json::to_vec(&verdict(100)).unwrap().len();

        assert!(encode(&verdict(100), json_len, Compress::Auto).unwrap().compressed);
        assert!(!encode(&verdict(100), json_len + 1, Compress::Auto).unwrap().compressed);
    }

    #[rstest]
    #[case(Compress::Never, 10_000, false)]
    #[case(Compress::Always, 1, true)]
    #[case(Compress::Auto, 10_000, true)]
    #[case(Compress::Auto, 1, false)]
    fn test_compress_modes(#[case] mode: Compress, #[case] note_len: usize, #[case] compressed: bool) {
        let value = verdict(note_len);
        let encoded = encode(&value, 1024, mode).unwrap();

        assert_eq!(encoded.compressed, compressed);
        assert_eq!(decode::<Verdict>(&encoded.bytes).unwrap(), value);
    }

    #[test]
    fn test_compression_shrinks_repetitive_payload() {
        let encoded = encode(&verdict(8192), 1024, Compress::Auto).unwrap();
        assert_eq!(encoded.bytes[0], TAG_GZIP);
        assert!(encoded.bytes.len() < 1024);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode::<Verdict>(&[]), Err(CodecError::Empty)));
        assert!(matches!(decode::<Verdict>(&[0x7f, b'{', b'}']), Err(CodecError::UnknownTag(0x7f))));
        assert!(matches!(decode::<Verdict>(&[TAG_PLAIN, b'{']), Err(CodecError::Deserialize(_))));
        assert!(matches!(decode::<Verdict>(&[TAG_GZIP, 0x00, 0x01]), Err(CodecError::Gzip(_))));
    }

    #[test]
    fn test_decode_wrong_shape_is_error() {
        let encoded = encode(&vec![1, 2, 3], 1024, Compress::Auto).unwrap();
        assert!(matches!(decode::<Verdict>(&encoded.bytes), Err(CodecError::Deserialize(_))));
    }

    #[test]
    fn test_non_string_map_keys_fail_to_serialize() {
        let mut map = BTreeMap::new();
        map.insert((1, 2), "tuple keys are not JSON object keys");
        assert!(matches!(encode(&map, 1024, Compress::Auto), Err(CodecError::Serialize(_))));
    }
}
