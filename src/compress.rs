//! Payload compression and the length-prefixed framing BooSt wraps around it.
//!
//! A compressed payload is a big-endian `u32` holding the decompressed length,
//! immediately followed by a raw deflate stream. The header's `image_size`
//! counts both.
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};

use crate::errors::{Error, Result};
use crate::header::consts::MAX_IMAGE_SIZE;

/// Size of the decompressed-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// An opaque deflate/inflate byte-stream transform.
pub trait Compressor {
    fn deflate(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Inflates `stream`, which must decompress to exactly `expected_len`
    /// bytes.
    fn inflate(&self, stream: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

impl<T: Compressor + ?Sized> Compressor for &T {
    fn deflate(&self, raw: &[u8]) -> Result<Vec<u8>> {
        (**self).deflate(raw)
    }

    fn inflate(&self, stream: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        (**self).inflate(stream, expected_len)
    }
}

/// Compresses `raw` and prepends its length.
pub fn frame<Z: Compressor>(compressor: &Z, raw: &[u8]) -> Result<Vec<u8>> {
    let raw_len = u32::try_from(raw.len()).map_err(|_| Error::ImageTooLarge {
        size: raw.len(),
        max: MAX_IMAGE_SIZE,
    })?;
    let stream = compressor.deflate(raw)?;

    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + stream.len());
    framed.extend_from_slice(&[0; LENGTH_PREFIX_SIZE]);
    BigEndian::write_u32(&mut framed[..LENGTH_PREFIX_SIZE], raw_len);
    framed.extend_from_slice(&stream);
    Ok(framed)
}

/// Reads the length prefix of a framed payload and inflates the stream after
/// it.
pub fn unframe<Z: Compressor>(compressor: &Z, framed: &[u8]) -> Result<Vec<u8>> {
    if framed.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::DecompressionError("payload shorter than its length prefix"));
    }
    let expected_len = BigEndian::read_u32(framed) as usize;
    if expected_len > MAX_IMAGE_SIZE {
        return Err(Error::ImageTooLarge {
            size: expected_len,
            max: MAX_IMAGE_SIZE,
        });
    }
    compressor.inflate(&framed[LENGTH_PREFIX_SIZE..], expected_len)
}

#[cfg(feature = "std")]
pub use self::deflate::Deflate;

#[cfg(feature = "std")]
mod deflate {
    use alloc::vec::Vec;
    use flate2::read::DeflateDecoder;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    use super::Compressor;
    use crate::errors::{Error, Result};

    /// Raw deflate (RFC 1951) streams through `flate2`, with no zlib or gzip
    /// wrapper.
    #[derive(Debug, Clone, Copy)]
    pub struct Deflate {
        level: Compression,
    }

    impl Deflate {
        pub fn new(level: u32) -> Self {
            Self {
                level: Compression::new(level),
            }
        }
    }

    impl Default for Deflate {
        fn default() -> Self {
            Self {
                level: Compression::default(),
            }
        }
    }

    impl Compressor for Deflate {
        fn deflate(&self, raw: &[u8]) -> Result<Vec<u8>> {
            let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
            encoder
                .write_all(raw)
                .and_then(|_| encoder.finish())
                .map_err(|_| Error::CompressionError("deflate encoder failed"))
        }

        fn inflate(&self, stream: &[u8], expected_len: usize) -> Result<Vec<u8>> {
            let mut raw = Vec::with_capacity(expected_len);
            // One byte of slack so an overlong stream is noticed without
            // inflating all of it.
            DeflateDecoder::new(stream)
                .take(expected_len as u64 + 1)
                .read_to_end(&mut raw)
                .map_err(|_| Error::DecompressionError("corrupt deflate stream"))?;
            if raw.len() != expected_len {
                log::warn!(
                    "deflate stream inflated to {} bytes, header declares {}",
                    raw.len(),
                    expected_len
                );
                return Err(Error::DecompressionError(
                    "decompressed size does not match the length prefix",
                ));
            }
            Ok(raw)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::compress::{frame, unframe, LENGTH_PREFIX_SIZE};

        #[test]
        fn frame_prefixes_big_endian_length() {
            let raw = [0x5Au8; 300];
            let framed = frame(&Deflate::default(), &raw).unwrap();
            assert_eq!(&framed[..LENGTH_PREFIX_SIZE], &[0, 0, 0x01, 0x2C]);
            assert_eq!(unframe(&Deflate::default(), &framed).unwrap(), raw);
        }

        #[test]
        fn stream_has_no_zlib_wrapper() {
            let raw = b"kernel bytes, kernel bytes, kernel bytes";
            let framed = frame(&Deflate::default(), raw).unwrap();
            assert_ne!(&framed[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + 2], &[0x78, 0x9C]);

            let mut inflated = Vec::new();
            DeflateDecoder::new(&framed[LENGTH_PREFIX_SIZE..])
                .read_to_end(&mut inflated)
                .unwrap();
            assert_eq!(inflated, raw);
        }

        #[test]
        fn corrupt_stream_is_rejected() {
            let mut framed = frame(&Deflate::default(), b"some kernel bytes").unwrap();
            // Final block with the reserved block type.
            framed[LENGTH_PREFIX_SIZE] = 0x07;
            assert!(matches!(
                unframe(&Deflate::default(), &framed),
                Err(Error::DecompressionError(_))
            ));
        }

        #[test]
        fn length_mismatch_is_rejected() {
            let mut framed = frame(&Deflate::default(), &[1u8; 64]).unwrap();
            framed[3] = 63;
            assert!(matches!(
                unframe(&Deflate::default(), &framed),
                Err(Error::DecompressionError(_))
            ));
            framed[3] = 65;
            assert!(matches!(
                unframe(&Deflate::default(), &framed),
                Err(Error::DecompressionError(_))
            ));
        }

        #[test]
        fn missing_prefix_is_rejected() {
            assert!(matches!(
                unframe(&Deflate::default(), &[0, 0]),
                Err(Error::DecompressionError(_))
            ));
        }

        #[test]
        fn oversized_prefix_is_rejected() {
            assert!(matches!(
                unframe(&Deflate::default(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x03, 0x00]),
                Err(Error::ImageTooLarge { .. })
            ));
        }
    }
}
