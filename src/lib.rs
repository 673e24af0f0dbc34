//! Lightweight library for packing and unpacking Psion NetBook Pro BooSt images.
//!
//! A BooSt image is a fixed 316-byte header followed by an optionally
//! deflate-compressed payload. The payload carries a kernel, an optional
//! bootcode and an optional ramdisk, located through an ARM branch word at the
//! start of the payload rather than through explicit offsets.
//!
//! Compression and checksumming go through the [`compress::Compressor`] and
//! [`checksum::Checksum`] traits so the codec stays usable on `no_std`
//! targets; the `std` feature brings in a raw deflate adapter.
#![no_std]
#![deny(
    // warnings,
    unused_imports,
    missing_debug_implementations,
    // missing_docs,
    clippy::all,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    variant_size_differences
)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod branch;
pub mod checksum;
pub mod compress;
mod errors;
pub mod header;
pub mod image;

pub use self::errors::{Error, Result};
pub use self::header::{BootcodeHeader, ChecksumStatus, Flags, ImageId, OuterHeader, Verification};
pub use self::image::{
    BoostImage, BuildMode, BuildOptions, ImageBuilder, ImageComponents, ImageParts, Layout,
    SplitImage,
};
