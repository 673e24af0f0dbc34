use byteorder::{ByteOrder, LittleEndian};
use core2::io::{Error as IoError, Read, Write};

use super::consts::*;
use super::HeaderTrait;

/// The record at the start of a new-layout bootcode region.
///
/// The first word looks like `0xMMMMMVVV`: a 20-bit magic followed by a
/// 12-bit version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootcodeHeader {
    pub magic: u32,
    /// Offset of this record from the start of the decompressed payload.
    pub bcode_offset: u32,
    /// Size of the ramdisk that closes the payload.
    pub ramdisk_size: u32,
    _reserved: u32,
}

impl HeaderTrait for BootcodeHeader {
    fn get_header_size(&self) -> usize {
        BCODE_HEADER_SIZE
    }

    fn read_from<R>(src: &mut R) -> Result<Self, IoError>
    where
        Self: Sized,
        R: Read,
    {
        let mut buffer = [0; BCODE_HEADER_SIZE];
        src.read_exact(&mut buffer)?;
        Ok(Self::parse(&buffer))
    }

    fn write_to<W>(&self, dst: &mut W) -> Result<usize, IoError>
    where
        Self: Sized,
        W: Write,
    {
        dst.write_all(&self.to_bytes())?;
        Ok(BCODE_HEADER_SIZE)
    }
}

impl BootcodeHeader {
    /// A current-version record with the given placement.
    pub fn new(bcode_offset: u32, ramdisk_size: u32) -> Self {
        Self {
            magic: BCODE_MAGIC | BCODE_VERSION,
            bcode_offset,
            ramdisk_size,
            _reserved: 0,
        }
    }

    /// Reads the record without checking its magic.
    pub fn parse(src: &[u8; BCODE_HEADER_SIZE]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&src[0..]),
            bcode_offset: LittleEndian::read_u32(&src[4..]),
            ramdisk_size: LittleEndian::read_u32(&src[8..]),
            _reserved: LittleEndian::read_u32(&src[12..]),
        }
    }

    pub fn to_bytes(&self) -> [u8; BCODE_HEADER_SIZE] {
        let mut dst = [0; BCODE_HEADER_SIZE];
        LittleEndian::write_u32(&mut dst[0..4], self.magic);
        LittleEndian::write_u32(&mut dst[4..8], self.bcode_offset);
        LittleEndian::write_u32(&mut dst[8..12], self.ramdisk_size);
        LittleEndian::write_u32(&mut dst[12..16], self._reserved);
        dst
    }

    /// Checks a leading bootcode word for the magic and a supported version.
    pub fn is_valid_magic(word: u32) -> bool {
        word & BCODE_MAGIC_MASK == BCODE_MAGIC && word & BCODE_VERSION_MASK == BCODE_VERSION
    }

    pub fn has_correct_magic(&self) -> bool {
        Self::is_valid_magic(self.magic)
    }

    pub fn version(&self) -> u32 {
        self.magic & BCODE_VERSION_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_and_version_are_both_checked() {
        assert!(BootcodeHeader::is_valid_magic(0xBC0D_E001));
        assert!(!BootcodeHeader::is_valid_magic(0xBC0D_E002));
        assert!(!BootcodeHeader::is_valid_magic(0xBC0D_F001));
        assert!(!BootcodeHeader::is_valid_magic(0x01E0_0DBC));
    }

    #[test]
    fn new_records_are_valid() {
        let header = BootcodeHeader::new(0x1010, 200);
        assert!(header.has_correct_magic());
        assert_eq!(header.version(), 1);
        assert_eq!(
            header.to_bytes(),
            [0x01, 0xE0, 0x0D, 0xBC, 0x10, 0x10, 0, 0, 200, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(BootcodeHeader::parse(&header.to_bytes()), header);
    }
}
