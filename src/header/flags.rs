bitflags::bitflags! {
    /// Flags word of the outer header.
    ///
    /// Only `ZLIB_COMPRESSED` changes how the payload is decoded; the rest is
    /// carried for the flashing tool on the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Image runs from RAM.
        const RAM_IMAGE = 1 << 0;
        /// Store without header.
        const NO_HEADER = 1 << 1;
        const ERASE_BEFORE_WRITE = 1 << 2;
        const NO_RESET_BEFORE_START = 1 << 3;
        const COPY_TO_OS_PARTITION = 1 << 4;
        /// Payload is length-prefixed zlib.
        const ZLIB_COMPRESSED = 1 << 16;
        /// Image includes a splash screen.
        const HAS_SPLASH = 1 << 17;
    }
}

impl Flags {
    /// Human readable names of the set flags, in bit order.
    pub fn descriptions(self) -> impl Iterator<Item = &'static str> {
        [
            (Flags::RAM_IMAGE, "RAM image"),
            (Flags::NO_HEADER, "No header"),
            (Flags::ERASE_BEFORE_WRITE, "Erase before saving"),
            (Flags::NO_RESET_BEFORE_START, "No reset before starting"),
            (Flags::COPY_TO_OS_PARTITION, "Copy to OS partition"),
            (Flags::ZLIB_COMPRESSED, "Compressed with zlib"),
            (Flags::HAS_SPLASH, "Has splash"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn unknown_bits_survive() {
        let flags = Flags::from_bits_retain(0x8001_0003);
        assert!(flags.contains(Flags::ZLIB_COMPRESSED));
        assert_eq!(flags.bits(), 0x8001_0003);
    }

    #[test]
    fn descriptions_follow_bit_order() {
        let flags = Flags::RAM_IMAGE | Flags::NO_HEADER | Flags::ZLIB_COMPRESSED;
        let names: Vec<_> = flags.descriptions().collect();
        assert_eq!(names, ["RAM image", "No header", "Compressed with zlib"]);
    }
}
