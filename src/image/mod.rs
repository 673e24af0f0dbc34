mod build;
mod layout;
pub mod split;

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core2::io::{Read, Write};

use crate::checksum::Checksum;
use crate::compress::{self, Compressor};
use crate::errors::{Error, Result};
use crate::header::consts::HEADER_SIZE;
use crate::header::{HeaderTrait, OuterHeader, Verification};

pub use self::build::{assemble, BuildMode, BuildOptions, ImageBuilder, ImageComponents};
pub use self::layout::Layout;
pub use self::split::{ImageParts, Region, RegionMap, SplitImage};

const READ_CHUNK: usize = 64 * 1024;

/// A BooSt image in memory: the header and the payload exactly as stored.
///
/// Checking the checksums and splitting the payload are separate steps, so a
/// caller can extract an image whose checksums do not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoostImage {
    /// The header of this image.
    header: OuterHeader,
    /// The payload, `image_size` bytes, possibly compressed.
    payload: Vec<u8>,
}

impl BoostImage {
    /// Pairs a header with its payload. Nothing is recomputed.
    pub fn new(header: OuterHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Reads an image out of a byte buffer, such as a mapped file.
    ///
    /// Bytes beyond `316 + image_size` are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let mut raw = [0; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = OuterHeader::parse(&raw);

        let end = HEADER_SIZE + header.image_size as usize;
        if bytes.len() < end {
            return Err(Error::Truncated {
                expected: end,
                actual: bytes.len(),
            });
        }
        if bytes.len() > end {
            log::warn!("ignoring {} bytes after the payload", bytes.len() - end);
        }
        Ok(Self::new(header, bytes[HEADER_SIZE..end].to_vec()))
    }

    /// Reads the header and then exactly `image_size` payload bytes.
    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        let header = OuterHeader::read_from(src)?;
        let image_size = header.image_size as usize;

        // Grow as data arrives rather than trusting image_size up front.
        let mut payload = Vec::new();
        while payload.len() < image_size {
            let filled = payload.len();
            let want = (image_size - filled).min(READ_CHUNK);
            payload.resize(filled + want, 0);
            let read = src.read(&mut payload[filled..])?;
            payload.truncate(filled + read);
            if read == 0 {
                return Err(Error::Truncated {
                    expected: HEADER_SIZE + image_size,
                    actual: HEADER_SIZE + filled,
                });
            }
        }
        Ok(Self::new(header, payload))
    }

    /// Writes the image to a `Write` target. Returns the amount of bytes
    /// written.
    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let mut bytes_written = self.header.write_to(dst)?;
        dst.write_all(&self.payload)?;
        bytes_written += self.payload.len();
        Ok(bytes_written)
    }

    /// The complete on-disk image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn header(&self) -> &OuterHeader {
        &self.header
    }

    /// The payload as stored, compressed or not.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (OuterHeader, Vec<u8>) {
        (self.header, self.payload)
    }

    /// Recomputes both checksums. Mismatches are logged, not raised.
    pub fn verify<C: Checksum>(&self, checksum: &C) -> Verification {
        let verification = self.header.verify(&self.payload, checksum);
        for mismatch in verification.mismatches() {
            log::warn!("{}", mismatch);
        }
        verification
    }

    /// The payload with any compression framing removed.
    pub fn decompress<Z: Compressor>(&self, compressor: &Z) -> Result<Cow<'_, [u8]>> {
        if self.header.is_compressed() {
            let raw = compress::unframe(compressor, &self.payload)?;
            log::debug!("inflated {} bytes to {}", self.payload.len(), raw.len());
            Ok(Cow::Owned(raw))
        } else {
            Ok(Cow::Borrowed(self.payload.as_slice()))
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::classify(&self.header)
    }

    /// Decompresses the payload and splits it into its components.
    ///
    /// Checksums are not consulted; call [`BoostImage::verify`] for that.
    pub fn split<Z: Compressor>(&self, compressor: &Z) -> Result<SplitImage> {
        let payload = self.decompress(compressor)?;
        split::split(&payload, &self.layout())
    }

    /// Region offsets inside the decompressed payload, without copying them
    /// out. `None` for payloads of unknown format.
    pub fn regions<Z: Compressor>(&self, compressor: &Z) -> Result<Option<RegionMap>> {
        let payload = self.decompress(compressor)?;
        split::locate(&payload, &self.layout())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::checksum::Cksum;
    use crate::compress::Deflate;
    use alloc::vec;

    fn simple_image(compress: bool) -> BoostImage {
        ImageBuilder::new(&[0xE1, 0xA0, 0x00, 0x00, 1, 2, 3, 4])
            .compress(compress)
            .build(&Cksum, &Deflate::default())
            .unwrap()
    }

    #[test]
    fn parse_reads_back_to_bytes() {
        let image = simple_image(true);
        let bytes = image.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + image.header().image_size as usize);
        assert_eq!(BoostImage::parse(&bytes).unwrap(), image);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let image = simple_image(false);
        let mut bytes = image.to_bytes();
        bytes.extend_from_slice(&[0xFF; 32]);
        assert_eq!(BoostImage::parse(&bytes).unwrap(), image);
    }

    #[test]
    fn truncated_input_is_reported() {
        let bytes = simple_image(false).to_bytes();
        assert!(matches!(
            BoostImage::parse(&bytes[..100]),
            Err(Error::Truncated { expected: HEADER_SIZE, actual: 100 })
        ));
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            BoostImage::parse(short),
            Err(Error::Truncated { .. })
        ));
        assert!(matches!(
            BoostImage::read_from(&mut &short[..]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn read_from_and_write_to_agree() {
        let image = simple_image(true);
        let mut buffer = Vec::new();
        let written = image.write_to(&mut buffer).unwrap();
        assert_eq!(written, buffer.len());
        assert_eq!(buffer, image.to_bytes());
        assert_eq!(BoostImage::read_from(&mut &buffer[..]).unwrap(), image);
    }

    #[test]
    fn uncompressed_payload_is_borrowed() {
        let image = simple_image(false);
        assert!(matches!(image.decompress(&Deflate::default()).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn non_branch_kernel_is_opaque() {
        let image = simple_image(true);
        assert_eq!(
            image.split(&Deflate::default()).unwrap(),
            SplitImage::Opaque(vec![0xE1, 0xA0, 0x00, 0x00, 1, 2, 3, 4])
        );
        assert_eq!(image.regions(&Deflate::default()).unwrap(), None);
    }
}
