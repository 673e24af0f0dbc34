use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use core2::io::{Error as IoError, Read, Write};

use super::consts::*;
use super::{fill_nul, trim_nul, Flags, HeaderTrait};
use crate::branch;
use crate::checksum::Checksum;
use crate::errors::{Error, Result};

/// What kind of image the header describes.
///
/// Stored as a four character ASCII tag; unrecognised values are kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageId {
    Exec,
    Script,
    Boot,
    Pcon,
    Unknown(u32),
}

impl ImageId {
    const EXEC: u32 = u32::from_le_bytes(*b"EXEC");
    const SCRIPT: u32 = u32::from_le_bytes(*b"SCPT");
    const BOOT: u32 = u32::from_le_bytes(*b"BOOT");
    const PCON: u32 = u32::from_le_bytes(*b"PCON");
}

impl From<u32> for ImageId {
    fn from(value: u32) -> Self {
        match value {
            ImageId::EXEC => ImageId::Exec,
            ImageId::SCRIPT => ImageId::Script,
            ImageId::BOOT => ImageId::Boot,
            ImageId::PCON => ImageId::Pcon,
            other => ImageId::Unknown(other),
        }
    }
}

impl From<ImageId> for u32 {
    fn from(id: ImageId) -> Self {
        match id {
            ImageId::Exec => ImageId::EXEC,
            ImageId::Script => ImageId::SCRIPT,
            ImageId::Boot => ImageId::BOOT,
            ImageId::Pcon => ImageId::PCON,
            ImageId::Unknown(other) => other,
        }
    }
}

/// The 316 byte header in front of every BooSt image.
///
/// Every byte of the record is kept, reserved ones included, so a parsed
/// header serializes back to exactly the bytes it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterHeader {
    /// Plain ARM branch over the header. Only reported, never followed.
    pub branch_offset: u32,
    _reserved: [u8; 4],
    pub image_id: ImageId,
    /// Four character platform tag, `nBk2` on the NetBook Pro.
    pub platform_id: [u8; PLATFORM_ID_SIZE],
    /// Size of the payload following the header, as stored on disk.
    pub image_size: u32,
    /// Digest of the payload.
    pub image_checksum: u32,
    /// Memory address EXEC images are loaded to.
    pub load_offset: u32,
    pub flags: Flags,
    /// Name of the file the image is flashed to. NUL-padded ASCII.
    pub target_filename: [u8; TARGET_FILENAME_SIZE],
    _reserved_2: [u8; RESERVED_2_SIZE],
    /// Free text describing the image. NUL-padded ASCII.
    pub description: [u8; DESCRIPTION_SIZE],
    /// Image version. NUL-padded ASCII, doubles as the legacy layout marker.
    pub version: [u8; VERSION_SIZE],
    pub mutex_bits: u32,
    _reserved_3: [u8; RESERVED_3_SIZE],
    /// Digest of the first 252 bytes of the header.
    pub checksum: u32,
    _trailer: [u8; TRAILER_SIZE],
}

impl HeaderTrait for OuterHeader {
    fn get_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn read_from<R>(src: &mut R) -> core::result::Result<Self, IoError>
    where
        Self: Sized,
        R: Read,
    {
        let mut buffer = [0; HEADER_SIZE];
        src.read_exact(&mut buffer)?;
        Ok(Self::parse(&buffer))
    }

    fn write_to<W>(&self, dst: &mut W) -> core::result::Result<usize, IoError>
    where
        Self: Sized,
        W: Write,
    {
        dst.write_all(&self.to_bytes())?;
        Ok(HEADER_SIZE)
    }
}

impl OuterHeader {
    /// Reads a header from its on-disk bytes. No field is validated, so this
    /// cannot fail; use [`OuterHeader::verify`] to find out whether the
    /// bytes were worth reading.
    pub fn parse(src: &[u8; HEADER_SIZE]) -> Self {
        let mut header = Self::zeroed();
        header.branch_offset = LittleEndian::read_u32(&src[0..]);
        header._reserved.copy_from_slice(&src[4..8]);
        header.image_id = ImageId::from(LittleEndian::read_u32(&src[8..]));
        header.platform_id.copy_from_slice(&src[12..16]);
        header.image_size = LittleEndian::read_u32(&src[16..]);
        header.image_checksum = LittleEndian::read_u32(&src[20..]);
        header.load_offset = LittleEndian::read_u32(&src[24..]);
        header.flags = Flags::from_bits_retain(LittleEndian::read_u32(&src[28..]));
        header.target_filename.copy_from_slice(&src[32..48]);
        header._reserved_2.copy_from_slice(&src[48..64]);
        header.description.copy_from_slice(&src[64..128]);
        header.version.copy_from_slice(&src[128..192]);
        header.mutex_bits = LittleEndian::read_u32(&src[192..]);
        header._reserved_3.copy_from_slice(&src[196..252]);
        header.checksum = LittleEndian::read_u32(&src[252..]);
        header._trailer.copy_from_slice(&src[256..HEADER_SIZE]);
        header
    }

    /// Serializes the header into its on-disk form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut dst = [0; HEADER_SIZE];
        LittleEndian::write_u32(&mut dst[0..4], self.branch_offset);
        dst[4..8].copy_from_slice(&self._reserved);
        LittleEndian::write_u32(&mut dst[8..12], self.image_id.into());
        dst[12..16].copy_from_slice(&self.platform_id);
        LittleEndian::write_u32(&mut dst[16..20], self.image_size);
        LittleEndian::write_u32(&mut dst[20..24], self.image_checksum);
        LittleEndian::write_u32(&mut dst[24..28], self.load_offset);
        LittleEndian::write_u32(&mut dst[28..32], self.flags.bits());
        dst[32..48].copy_from_slice(&self.target_filename);
        dst[48..64].copy_from_slice(&self._reserved_2);
        dst[64..128].copy_from_slice(&self.description);
        dst[128..192].copy_from_slice(&self.version);
        LittleEndian::write_u32(&mut dst[192..196], self.mutex_bits);
        dst[196..252].copy_from_slice(&self._reserved_3);
        LittleEndian::write_u32(&mut dst[252..256], self.checksum);
        dst[256..].copy_from_slice(&self._trailer);
        dst
    }

    /// Creates the header for `payload`, as the device expects a freshly
    /// built image to look.
    ///
    /// The header checksum is computed last, once every other field is
    /// final.
    pub fn build<C: Checksum>(
        payload: &[u8],
        description: &str,
        version: &str,
        load_offset: u32,
        compressed: bool,
        checksum: &C,
    ) -> Result<Self> {
        let image_size = u32::try_from(payload.len()).map_err(|_| Error::ImageTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut header = Self::default();
        header.set_description(description);
        header.set_version(version);
        header.load_offset = load_offset;
        header.flags = Flags::RAM_IMAGE | Flags::NO_HEADER;
        if compressed {
            header.flags |= Flags::ZLIB_COMPRESSED;
        }
        header.image_size = image_size;
        header.image_checksum = checksum.digest(payload);
        header.seal(checksum);
        Ok(header)
    }

    /// Recomputes the header checksum over the current field values.
    pub fn compute_checksum<C: Checksum>(&self, checksum: &C) -> u32 {
        checksum.digest(&self.to_bytes()[..HEADER_CHECKSUM_BYTES])
    }

    /// Stores the checksum of the current field values in the header.
    pub fn seal<C: Checksum>(&mut self, checksum: &C) {
        self.checksum = self.compute_checksum(checksum);
    }

    /// Recomputes both checksums and compares them with the stored ones.
    ///
    /// Never fails: a payload shorter than `image_size` simply does not match.
    pub fn verify<C: Checksum>(&self, payload: &[u8], checksum: &C) -> Verification {
        let header = ChecksumStatus {
            expected: self.checksum,
            actual: self.compute_checksum(checksum),
            truncated: false,
        };

        let image_size = self.image_size as usize;
        let covered = &payload[..image_size.min(payload.len())];
        let payload_status = ChecksumStatus {
            expected: self.image_checksum,
            actual: checksum.digest(covered),
            truncated: covered.len() < image_size,
        };
        if payload_status.truncated {
            log::warn!(
                "payload holds {} of {} bytes, image checksum cannot match",
                covered.len(),
                image_size
            );
        }

        Verification {
            header,
            payload: payload_status,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(Flags::ZLIB_COMPRESSED)
    }

    /// Target of the header's own branch word, relative to the header region.
    pub fn informational_branch_offset(&self) -> i32 {
        branch::decode_informational(self.branch_offset)
    }

    pub fn platform(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.platform_id))
    }

    pub fn target_filename(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.target_filename))
    }

    pub fn description(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.description))
    }

    /// The raw version text up to its first NUL.
    pub fn version_bytes(&self) -> &[u8] {
        trim_nul(&self.version)
    }

    pub fn version(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.version_bytes())
    }

    /// Replaces the description, truncated to 64 bytes.
    pub fn set_description(&mut self, description: &str) {
        fill_nul(&mut self.description, description.as_bytes());
    }

    /// Replaces the version string, truncated to 64 bytes.
    pub fn set_version(&mut self, version: &str) {
        fill_nul(&mut self.version, version.as_bytes());
    }

    pub fn set_target_filename(&mut self, name: &str) {
        fill_nul(&mut self.target_filename, name.as_bytes());
    }

    fn zeroed() -> Self {
        Self {
            branch_offset: 0,
            _reserved: [0; 4],
            image_id: ImageId::Unknown(0),
            platform_id: [0; PLATFORM_ID_SIZE],
            image_size: 0,
            image_checksum: 0,
            load_offset: 0,
            flags: Flags::empty(),
            target_filename: [0; TARGET_FILENAME_SIZE],
            _reserved_2: [0; RESERVED_2_SIZE],
            description: [0; DESCRIPTION_SIZE],
            version: [0; VERSION_SIZE],
            mutex_bits: 0,
            _reserved_3: [0; RESERVED_3_SIZE],
            checksum: 0,
            _trailer: [0; TRAILER_SIZE],
        }
    }
}

impl Default for OuterHeader {
    /// An all-zero header carrying the NetBook Pro platform tag.
    fn default() -> Self {
        Self {
            platform_id: PLATFORM_ID,
            ..Self::zeroed()
        }
    }
}

/// Stored versus recomputed value of one checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumStatus {
    pub expected: u32,
    /// Digest of the bytes that were actually present.
    pub actual: u32,
    /// Fewer bytes were present than the header declares.
    pub truncated: bool,
}

impl ChecksumStatus {
    /// A truncated range never matches, even if the digests collide.
    pub fn is_ok(&self) -> bool {
        !self.truncated && self.expected == self.actual
    }
}

/// Outcome of checking both image checksums. Purely advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub header: ChecksumStatus,
    pub payload: ChecksumStatus,
}

impl Verification {
    pub fn header_ok(&self) -> bool {
        self.header.is_ok()
    }

    pub fn payload_ok(&self) -> bool {
        self.payload.is_ok()
    }

    pub fn is_ok(&self) -> bool {
        self.header_ok() && self.payload_ok()
    }

    /// Each failed checksum as its own error, header first.
    pub fn mismatches(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        if !self.header_ok() {
            errors.push(Error::HeaderChecksumMismatch {
                expected: self.header.expected,
                actual: self.header.actual,
            });
        }
        if !self.payload_ok() {
            errors.push(Error::PayloadChecksumMismatch {
                expected: self.payload.expected,
                actual: self.payload.actual,
            });
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Cksum;

    fn sample_header() -> OuterHeader {
        let payload = [0x11u8; 64];
        let mut header =
            OuterHeader::build(&payload, "NetBook Pro OS", "X001", DEFAULT_LOAD_OFFSET, false, &Cksum)
                .unwrap();
        header.branch_offset = branch::encode_informational(0x100);
        header.image_id = ImageId::Exec;
        header.set_target_filename("nBkProOs.img");
        header.mutex_bits = 0x5;
        header.seal(&Cksum);
        header
    }

    #[test]
    fn parse_is_the_inverse_of_to_bytes() {
        let mut bytes = sample_header().to_bytes();
        // Reserved areas must survive as well.
        bytes[5] = 0x42;
        bytes[50] = 0x43;
        bytes[200] = 0x44;
        bytes[HEADER_SIZE - 1] = 0x45;
        assert_eq!(OuterHeader::parse(&bytes).to_bytes(), bytes);
    }

    #[test]
    fn fields_land_at_their_offsets() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[8..12], b"EXEC");
        assert_eq!(&bytes[12..16], b"nBk2");
        assert_eq!(LittleEndian::read_u32(&bytes[16..]), 64);
        assert_eq!(LittleEndian::read_u32(&bytes[24..]), 0x0020_8000);
        assert_eq!(LittleEndian::read_u32(&bytes[28..]), 0x3);
        assert_eq!(&bytes[32..44], b"nBkProOs.img");
        assert_eq!(&bytes[64..78], b"NetBook Pro OS");
        assert_eq!(bytes[78], 0);
        assert_eq!(&bytes[128..133], b"X001\0");
        assert_eq!(LittleEndian::read_u32(&bytes[192..]), 0x5);
        assert_eq!(LittleEndian::read_u32(&bytes[252..]), header.checksum);
    }

    #[test]
    fn read_and_write_through_streams() {
        let header = sample_header();
        let mut buffer = Vec::new();
        assert_eq!(header.write_to(&mut buffer).unwrap(), HEADER_SIZE);
        assert_eq!(buffer.len(), HEADER_SIZE);

        let read = OuterHeader::read_from(&mut &buffer[..]).unwrap();
        assert_eq!(read, header);

        assert!(OuterHeader::read_from(&mut &buffer[..HEADER_SIZE - 1]).is_err());
    }

    #[test]
    fn build_sets_flags_and_checksums() {
        let payload = b"compressed or not, these are payload bytes";
        let header = OuterHeader::build(payload, "desc", "ver", 0x1000, true, &Cksum).unwrap();
        assert_eq!(
            header.flags,
            Flags::RAM_IMAGE | Flags::NO_HEADER | Flags::ZLIB_COMPRESSED
        );
        assert_eq!(header.image_size as usize, payload.len());
        assert_eq!(header.image_checksum, Cksum.digest(payload));
        assert_eq!(header.platform(), "nBk2");
        assert_eq!(header.image_id, ImageId::Unknown(0));
        assert_eq!(&header.to_bytes()[8..12], &[0; 4]);
        assert!(header.verify(payload, &Cksum).is_ok());
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "v".repeat(100);
        let header = OuterHeader::build(&[], &long, &long, 0, false, &Cksum).unwrap();
        assert_eq!(header.description().len(), DESCRIPTION_SIZE);
        assert_eq!(header.version_bytes().len(), VERSION_SIZE);
    }

    #[test]
    fn every_covered_byte_affects_the_header_checksum() {
        let header = sample_header();
        let bytes = header.to_bytes();
        for index in 0..HEADER_CHECKSUM_BYTES {
            let mut corrupted = bytes;
            corrupted[index] ^= 0x01;
            let verification = OuterHeader::parse(&corrupted).verify(&[0x11; 64], &Cksum);
            assert!(!verification.header_ok(), "byte {} not covered", index);
            assert!(verification.payload_ok() || index < 24);
        }
    }

    #[test]
    fn trailer_is_not_covered() {
        let mut bytes = sample_header().to_bytes();
        bytes[300] = 0xFF;
        assert!(OuterHeader::parse(&bytes).verify(&[0x11; 64], &Cksum).is_ok());
    }

    #[test]
    fn mismatches_are_reported_independently() {
        let header = sample_header();
        let verification = header.verify(&[0x12; 64], &Cksum);
        assert!(verification.header_ok());
        assert!(!verification.payload_ok());
        let errors = verification.mismatches();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::PayloadChecksumMismatch { .. }));
    }

    #[test]
    fn short_payload_never_verifies() {
        let header = sample_header();
        let verification = header.verify(&[0x11; 63], &Cksum);
        assert!(!verification.payload_ok());
        assert!(verification.payload.truncated);
        assert_eq!(verification.payload.actual, Cksum.digest(&[0x11; 63]));
    }

    #[test]
    fn short_payload_reports_its_real_digest_on_collision() {
        let mut header = sample_header();
        let short = [0x11; 63];
        header.image_checksum = Cksum.digest(&short);
        header.seal(&Cksum);

        let verification = header.verify(&short, &Cksum);
        assert!(verification.header_ok());
        assert!(!verification.payload_ok());
        assert_eq!(verification.payload.actual, verification.payload.expected);
        assert!(verification.payload.truncated);
    }

    #[test]
    fn image_ids_round_trip() {
        for id in [ImageId::Exec, ImageId::Script, ImageId::Boot, ImageId::Pcon, ImageId::Unknown(7)] {
            assert_eq!(ImageId::from(u32::from(id)), id);
        }
    }

    #[test]
    fn informational_branch_offset_is_reported() {
        assert_eq!(sample_header().informational_branch_offset(), 0x100);
    }
}
