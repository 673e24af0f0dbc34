use core2::io::Error as IoError;
use thiserror_no_std::Error;

/// Everything that can go wrong while packing or unpacking an image.
///
/// The two checksum variants are advisory: [`crate::Verification`] produces
/// them for reporting, but nothing in the codec refuses to continue because of
/// them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Header checksum mismatch (expected {expected:#010x}, got {actual:#010x}).")]
    HeaderChecksumMismatch { expected: u32, actual: u32 },
    #[error("Image checksum mismatch (expected {expected:#010x}, got {actual:#010x}).")]
    PayloadChecksumMismatch { expected: u32, actual: u32 },
    #[error("Failed to compress payload: {0}")]
    CompressionError(&'static str),
    #[error("Failed to decompress payload: {0}")]
    DecompressionError(&'static str),
    #[error("Bootcode does not start with a valid sub-header (leading word {0:#010x}).")]
    InvalidBootcode(u32),
    #[error("Unsupported combination of image components: {0}")]
    UnsupportedComponentCombination(&'static str),
    #[error("Malformed payload layout: {region} region at {start} with length {len} does not fit in {payload_len} bytes.")]
    MalformedLayout {
        region: &'static str,
        start: i64,
        len: i64,
        payload_len: usize,
    },
    #[error("Image is truncated (expected {expected} bytes, found {actual}).")]
    Truncated { expected: usize, actual: usize },
    #[error("Image is too large ({size} bytes, at most {max} supported).")]
    ImageTooLarge { size: usize, max: usize },
    #[error("IO error whilst reading or writing image: {0}")]
    Io(IoError),
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
