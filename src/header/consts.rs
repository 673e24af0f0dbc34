pub use self::bcode::*;
pub use self::boost::*;
pub use self::defaults::*;

pub mod boost {
        /// Size of the outer header. The payload starts right after it.
        pub const HEADER_SIZE: usize = 316;
        /// Number of leading header bytes covered by the header checksum.
        pub const HEADER_CHECKSUM_BYTES: usize = 252;
        pub const PLATFORM_ID: [u8; PLATFORM_ID_SIZE] = *b"nBk2";
        pub const PLATFORM_ID_SIZE: usize = 4;
        pub const TARGET_FILENAME_SIZE: usize = 16;
        pub const RESERVED_2_SIZE: usize = 16;
        pub const DESCRIPTION_SIZE: usize = 64;
        pub const VERSION_SIZE: usize = 64;
        pub const RESERVED_3_SIZE: usize = 56;
        pub const TRAILER_SIZE: usize = 60;
        /// `version` field value marking the legacy payload layout.
        pub const LEGACY_VERSION_SENTINEL: &[u8] = b"K123m";
        /// The legacy kernel starts right after the leading branch word.
        pub const LEGACY_KERNEL_OFFSET: usize = 4;
        /// Distance between the legacy branch target and the bootcode.
        pub const LEGACY_BCODE_START_OFFSET: u32 = 408;
        pub const LEGACY_BCODE_SIZE: usize = 1052;
        /// Bytes reserved at the start of a new-layout payload for the
        /// startup branch.
        pub const STARTUP_BYTES: usize = 16;
}

pub mod bcode {
        pub const BCODE_HEADER_SIZE: usize = 16;
        pub const BCODE_MAGIC: u32 = 0xBC0D_E000;
        pub const BCODE_MAGIC_MASK: u32 = 0xFFFF_F000;
        pub const BCODE_VERSION_MASK: u32 = 0x0000_0FFF;
        pub const BCODE_VERSION: u32 = 1;
}

pub mod defaults {
        pub const DEFAULT_DESCRIPTION: &str = "NetBook Pro OS";
        pub const DEFAULT_VERSION: &str = "X001";
        pub const DEFAULT_LOAD_OFFSET: u32 = 0x0020_8000;
        pub const DEFAULT_OUTPUT_NAME: &str = "nBkProOs.img";
        /// Largest uncompressed payload we build or inflate.
        pub const MAX_IMAGE_SIZE: usize = 15 * 1024 * 1024;
}
