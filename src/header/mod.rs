use core::result::Result;
use core2::io::{Error, Read, Write};

pub mod consts;
mod bcode_header;
mod boost_header;
mod flags;

pub use self::bcode_header::BootcodeHeader;
pub use self::boost_header::{ChecksumStatus, ImageId, OuterHeader, Verification};
pub use self::flags::Flags;

/// A fixed-size, little-endian record that can be moved in and out of a byte
/// stream.
pub trait HeaderTrait {
    fn get_header_size(&self) -> usize;
    fn read_from<R>(src: &mut R) -> Result<Self, Error>
    where
        Self: Sized,
        R: Read;
    fn write_to<W>(&self, dst: &mut W) -> Result<usize, Error>
    where
        Self: Sized,
        W: Write;
}

/// Returns the bytes of a NUL-padded text field up to its first NUL.
pub(crate) fn trim_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Copies `text` into a NUL-padded field, truncating it if it does not fit.
pub(crate) fn fill_nul(field: &mut [u8], text: &[u8]) {
    let len = text.len().min(field.len());
    field[..len].copy_from_slice(&text[..len]);
    field[len..].fill(0);
}
