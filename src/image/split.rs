//! Locating kernel, bootcode and ramdisk inside a decompressed payload.
//!
//! Every region is first computed as a signed `(start, end)` pair, checked
//! against the payload, and only then copied out. A bad branch word or
//! sub-header therefore ends in [`Error::MalformedLayout`] rather than in an
//! out-of-bounds slice.
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

use super::layout::Layout;
use crate::branch;
use crate::errors::{Error, Result};
use crate::header::consts::*;
use crate::header::BootcodeHeader;

/// A validated byte range of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub len: usize,
}

impl Region {
    fn checked(name: &'static str, start: i64, end: i64, payload_len: usize) -> Result<Self> {
        if start < 0 || end < start || end > payload_len as i64 {
            return Err(Error::MalformedLayout {
                region: name,
                start,
                len: end - start,
                payload_len,
            });
        }
        Ok(Region {
            start: start as usize,
            len: (end - start) as usize,
        })
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    fn copy_from(&self, payload: &[u8]) -> Vec<u8> {
        payload[self.start..self.end()].to_vec()
    }
}

/// Where each component sits in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMap {
    pub kernel: Region,
    pub bootcode: Region,
    pub ramdisk: Region,
}

/// The components of an image, each in its own buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageParts {
    pub kernel: Vec<u8>,
    pub bootcode: Vec<u8>,
    pub ramdisk: Vec<u8>,
}

/// Result of splitting a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitImage {
    Parts(ImageParts),
    /// The payload did not start with a branch, so it was left whole.
    Opaque(Vec<u8>),
}

impl SplitImage {
    pub fn parts(&self) -> Option<&ImageParts> {
        match self {
            SplitImage::Parts(parts) => Some(parts),
            SplitImage::Opaque(_) => None,
        }
    }
}

/// Returns the leading word of a payload if it is an ARM branch.
fn leading_branch(payload: &[u8]) -> Option<u32> {
    if payload.len() < 4 {
        return None;
    }
    let word = LittleEndian::read_u32(payload);
    branch::is_branch(word).then_some(word)
}

/// Computes the component regions of `payload`.
///
/// Returns `Ok(None)` when the payload does not start with a branch word and
/// so has no layout we know of.
pub fn locate(payload: &[u8], layout: &Layout) -> Result<Option<RegionMap>> {
    let word = match leading_branch(payload) {
        Some(word) => word,
        None => return Ok(None),
    };
    let target = i64::from(branch::decode_link(word));
    let len = payload.len();

    let map = match layout {
        Layout::Legacy => {
            let bcode_offset = target - i64::from(LEGACY_BCODE_START_OFFSET);
            let bcode_end = bcode_offset + LEGACY_BCODE_SIZE as i64;
            RegionMap {
                kernel: Region::checked("kernel", LEGACY_KERNEL_OFFSET as i64, bcode_offset, len)?,
                bootcode: Region::checked("bootcode", bcode_offset, bcode_end, len)?,
                ramdisk: Region::checked("ramdisk", bcode_end, len as i64, len)?,
            }
        }
        Layout::New(_) => {
            let bcode_offset = target - BCODE_HEADER_SIZE as i64;
            let kernel = Region::checked("kernel", STARTUP_BYTES as i64, bcode_offset, len)?;
            let slot = Region::checked(
                "bootcode header",
                bcode_offset,
                bcode_offset + BCODE_HEADER_SIZE as i64,
                len,
            )?;

            // The sub-header magic is only checked when building.
            let mut raw = [0; BCODE_HEADER_SIZE];
            raw.copy_from_slice(&payload[slot.start..slot.end()]);
            let bcode_header = BootcodeHeader::parse(&raw);

            let ramdisk_offset = len as i64 - i64::from(bcode_header.ramdisk_size);
            RegionMap {
                kernel,
                bootcode: Region::checked("bootcode", bcode_offset, ramdisk_offset, len)?,
                ramdisk: Region::checked("ramdisk", ramdisk_offset, len as i64, len)?,
            }
        }
    };

    log::debug!(
        "kernel at {:#x} ({} bytes), bootcode at {:#x} ({} bytes), ramdisk at {:#x} ({} bytes)",
        map.kernel.start,
        map.kernel.len,
        map.bootcode.start,
        map.bootcode.len,
        map.ramdisk.start,
        map.ramdisk.len
    );
    Ok(Some(map))
}

/// Splits a decompressed payload into its components.
///
/// Payloads that do not start with a branch come back whole as
/// [`SplitImage::Opaque`]. Nothing is copied unless every region fits.
pub fn split(payload: &[u8], layout: &Layout) -> Result<SplitImage> {
    match locate(payload, layout)? {
        Some(map) => Ok(SplitImage::Parts(ImageParts {
            kernel: map.kernel.copy_from(payload),
            bootcode: map.bootcode.copy_from(payload),
            ramdisk: map.ramdisk.copy_from(payload),
        })),
        None => {
            log::warn!("payload does not start with a branch, leaving it whole");
            Ok(SplitImage::Opaque(payload.to_vec()))
        }
    }
}
