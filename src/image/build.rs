use alloc::string::String;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

use super::BoostImage;
use crate::branch;
use crate::checksum::Checksum;
use crate::compress::{self, Compressor};
use crate::errors::{Error, Result};
use crate::header::consts::*;
use crate::header::{BootcodeHeader, OuterHeader};

/// Header metadata for a new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub description: String,
    pub version: String,
    pub load_offset: u32,
    /// Compress a kernel-only image. Images with bootcode are always
    /// compressed.
    pub compress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            description: String::from(DEFAULT_DESCRIPTION),
            version: String::from(DEFAULT_VERSION),
            load_offset: DEFAULT_LOAD_OFFSET,
            compress: false,
        }
    }
}

/// The buffers an image is built from, borrowed for one build.
#[derive(Debug, Clone, Default)]
pub struct ImageComponents<'a> {
    pub kernel: &'a [u8],
    /// Must start with a valid [`BootcodeHeader`].
    pub bootcode: Option<&'a [u8]>,
    pub ramdisk: Option<&'a [u8]>,
    pub options: BuildOptions,
}

/// Which payload layout a set of components produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// The kernel is the whole payload.
    Simple,
    /// Startup branch, kernel, bootcode and optional ramdisk.
    Advanced,
}

impl<'a> ImageComponents<'a> {
    pub fn mode(&self) -> Result<BuildMode> {
        match (self.bootcode, self.ramdisk) {
            (None, None) => Ok(BuildMode::Simple),
            (Some(_), _) => Ok(BuildMode::Advanced),
            (None, Some(_)) => Err(Error::UnsupportedComponentCombination(
                "a ramdisk needs a bootcode to locate it",
            )),
        }
    }

    /// Builds the complete image: payload, compression and header.
    pub fn build<C, Z>(&self, checksum: &C, compressor: &Z) -> Result<BoostImage>
    where
        C: Checksum,
        Z: Compressor,
    {
        let (payload, compressed) = match self.mode()? {
            BuildMode::Simple => {
                check_size(self.kernel.len())?;
                if self.options.compress {
                    (compress::frame(compressor, self.kernel)?, true)
                } else {
                    (self.kernel.to_vec(), false)
                }
            }
            BuildMode::Advanced => {
                let bootcode = self.bootcode.unwrap_or_default();
                let ramdisk = self.ramdisk.unwrap_or_default();
                let scratch = assemble(self.kernel, bootcode, ramdisk)?;
                (compress::frame(compressor, &scratch)?, true)
            }
        };

        let header = OuterHeader::build(
            &payload,
            &self.options.description,
            &self.options.version,
            self.options.load_offset,
            compressed,
            checksum,
        )?;
        log::debug!(
            "built {} byte payload ({}compressed)",
            payload.len(),
            if compressed { "" } else { "un" }
        );
        Ok(BoostImage::new(header, payload))
    }
}

/// Lays out an uncompressed new-layout payload and patches its offsets.
///
/// The payload is a 16 byte startup block whose first word branches into the
/// bootcode, then the kernel, then the bootcode (led by its sub-header), then
/// the ramdisk.
pub fn assemble(kernel: &[u8], bootcode: &[u8], ramdisk: &[u8]) -> Result<Vec<u8>> {
    if bootcode.len() < BCODE_HEADER_SIZE {
        let word = if bootcode.len() >= 4 {
            LittleEndian::read_u32(bootcode)
        } else {
            0
        };
        return Err(Error::InvalidBootcode(word));
    }
    let magic = LittleEndian::read_u32(bootcode);
    if !BootcodeHeader::is_valid_magic(magic) {
        return Err(Error::InvalidBootcode(magic));
    }

    let total = STARTUP_BYTES + kernel.len() + bootcode.len() + ramdisk.len();
    check_size(total)?;

    let bcode_offset = STARTUP_BYTES + kernel.len();
    let mut scratch = Vec::with_capacity(total);
    scratch.resize(STARTUP_BYTES, 0);
    scratch.extend_from_slice(kernel);
    scratch.extend_from_slice(bootcode);
    scratch.extend_from_slice(ramdisk);

    // check_size keeps every offset well inside u32.
    let entry = branch::encode_link((bcode_offset + BCODE_HEADER_SIZE) as u32);
    LittleEndian::write_u32(&mut scratch[..4], entry);

    let slot = &mut scratch[bcode_offset..bcode_offset + BCODE_HEADER_SIZE];
    let mut raw = [0; BCODE_HEADER_SIZE];
    raw.copy_from_slice(slot);
    let mut bcode_header = BootcodeHeader::parse(&raw);
    bcode_header.bcode_offset = bcode_offset as u32;
    bcode_header.ramdisk_size = ramdisk.len() as u32;
    slot.copy_from_slice(&bcode_header.to_bytes());

    Ok(scratch)
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_IMAGE_SIZE {
        return Err(Error::ImageTooLarge {
            size,
            max: MAX_IMAGE_SIZE,
        });
    }
    Ok(())
}

/// Fluent front-end for [`ImageComponents`].
#[derive(Debug, Clone)]
pub struct ImageBuilder<'a> {
    components: ImageComponents<'a>,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(kernel: &'a [u8]) -> Self {
        Self {
            components: ImageComponents {
                kernel,
                ..ImageComponents::default()
            },
        }
    }

    pub fn bootcode(mut self, bootcode: &'a [u8]) -> Self {
        self.components.bootcode = Some(bootcode);
        self
    }

    pub fn ramdisk(mut self, ramdisk: &'a [u8]) -> Self {
        self.components.ramdisk = Some(ramdisk);
        self
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.components.options = options;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.components.options.description = String::from(description);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.components.options.version = String::from(version);
        self
    }

    pub fn load_offset(mut self, load_offset: u32) -> Self {
        self.components.options.load_offset = load_offset;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.components.options.compress = compress;
        self
    }

    pub fn components(&self) -> &ImageComponents<'a> {
        &self.components
    }

    pub fn build<C, Z>(&self, checksum: &C, compressor: &Z) -> Result<BoostImage>
    where
        C: Checksum,
        Z: Compressor,
    {
        self.components.build(checksum, compressor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::split;
    use crate::image::Layout;
    use alloc::vec;

    fn bootcode(body: &[u8]) -> Vec<u8> {
        let mut bootcode = BootcodeHeader::new(0, 0).to_bytes().to_vec();
        bootcode.extend_from_slice(body);
        bootcode
    }

    #[test]
    fn assemble_patches_branch_and_sub_header() {
        let scratch = assemble(&[7; 32], &bootcode(&[9; 8]), &[5; 3]).unwrap();
        assert_eq!(scratch.len(), 16 + 32 + 16 + 8 + 3);
        assert_eq!(LittleEndian::read_u32(&scratch), branch::encode_link(16 + 32 + 16));
        assert_eq!(&scratch[4..16], &[0; 12]);
        assert_eq!(&scratch[16..48], &[7; 32]);

        let mut raw = [0; BCODE_HEADER_SIZE];
        raw.copy_from_slice(&scratch[48..64]);
        let sub_header = BootcodeHeader::parse(&raw);
        assert!(sub_header.has_correct_magic());
        assert_eq!(sub_header.bcode_offset, 48);
        assert_eq!(sub_header.ramdisk_size, 3);
    }

    #[test]
    fn assembled_payload_splits_back() {
        let bootcode = bootcode(&[9; 8]);
        let scratch = assemble(&[7; 32], &bootcode, &[5; 3]).unwrap();
        let split = split::split(&scratch, &Layout::New(String::new())).unwrap();
        let parts = split.parts().unwrap();
        assert_eq!(parts.kernel, vec![7; 32]);
        assert_eq!(&parts.bootcode[..4], &bootcode[..4]);
        assert_eq!(&parts.bootcode[16..], &bootcode[16..]);
        assert_eq!(parts.ramdisk, vec![5; 3]);
    }

    #[test]
    fn invalid_bootcode_is_rejected() {
        let mut bad = bootcode(&[0; 4]);
        bad[0] = 0x02;
        assert!(matches!(
            assemble(&[0; 4], &bad, &[]),
            Err(Error::InvalidBootcode(0xBC0D_E002))
        ));
        assert!(matches!(
            assemble(&[0; 4], &[0x01, 0xE0, 0x0D, 0xBC], &[]),
            Err(Error::InvalidBootcode(0xBC0D_E001))
        ));
        assert!(matches!(
            assemble(&[0; 4], &[], &[]),
            Err(Error::InvalidBootcode(0))
        ));
    }

    #[test]
    fn ramdisk_without_bootcode_is_unsupported() {
        let components = ImageComponents {
            kernel: &[1, 2, 3],
            ramdisk: Some(&[4u8, 5, 6][..]),
            ..ImageComponents::default()
        };
        assert!(matches!(
            components.mode(),
            Err(Error::UnsupportedComponentCombination(_))
        ));
    }

    #[test]
    fn modes_follow_the_supplied_buffers() {
        let builder = ImageBuilder::new(&[1]);
        assert_eq!(builder.components().mode().unwrap(), BuildMode::Simple);
        let builder = builder.bootcode(&[2]);
        assert_eq!(builder.components().mode().unwrap(), BuildMode::Advanced);
        let builder = builder.ramdisk(&[3]);
        assert_eq!(builder.components().mode().unwrap(), BuildMode::Advanced);
    }

    #[test]
    fn defaults_match_the_netbook() {
        let options = BuildOptions::default();
        assert_eq!(options.description, "NetBook Pro OS");
        assert_eq!(options.version, "X001");
        assert_eq!(options.load_offset, 0x0020_8000);
        assert!(!options.compress);
    }

    #[test]
    fn oversized_scratch_is_rejected() {
        let kernel = vec![0; MAX_IMAGE_SIZE];
        assert!(matches!(
            assemble(&kernel, &bootcode(&[]), &[]),
            Err(Error::ImageTooLarge { .. })
        ));
    }
}
