use crc::{Crc, CRC_32_CKSUM};

/// A deterministic 32-bit digest over a byte range.
///
/// Both BooSt checksums (header and payload) go through this trait.
pub trait Checksum {
    fn digest(&self, bytes: &[u8]) -> u32;
}

const CKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_CKSUM);

/// The POSIX `cksum` CRC: CRC-32 over the data, then over the data length
/// (least significant byte first, without trailing zero bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct Cksum;

impl Checksum for Cksum {
    fn digest(&self, bytes: &[u8]) -> u32 {
        let mut digest = CKSUM.digest();
        digest.update(bytes);

        let mut remaining = bytes.len() as u64;
        while remaining != 0 {
            digest.update(&[remaining as u8]);
            remaining >>= 8;
        }

        digest.finalize()
    }
}

impl<T: Checksum + ?Sized> Checksum for &T {
    fn digest(&self, bytes: &[u8]) -> u32 {
        (**self).digest(bytes)
    }
}
