use alloc::string::String;

use crate::header::consts::LEGACY_VERSION_SENTINEL;
use crate::header::OuterHeader;

/// How kernel, bootcode and ramdisk are arranged inside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Original Psion images: fixed bias and a fixed 1052 byte bootcode.
    Legacy,
    /// Bootcode carries its own sub-header. Holds the image version text.
    New(String),
}

impl Layout {
    /// Classifies a header by its version string.
    ///
    /// Only an exact `K123m` marks the legacy layout; prefixes and other
    /// casings do not.
    pub fn classify(header: &OuterHeader) -> Self {
        if header.version_bytes() == LEGACY_VERSION_SENTINEL {
            Layout::Legacy
        } else {
            Layout::New(header.version().into_owned())
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Layout::Legacy)
    }
}
