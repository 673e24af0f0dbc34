//! ARM branch words used as self-describing offsets.
//!
//! BooSt payloads start with an unconditional ARM branch whose target tells us
//! where the bootcode lives. Two flavours are in use:
//!
//! * the branch-with-link form (`0xEB` top byte), whose target is an offset
//!   inside the decompressed payload and is the one the splitter and the
//!   builder rely on;
//! * the plain branch form (`0xEA` top byte), biased by 248 bytes because the
//!   offset is measured against the on-disk header region. It only appears in
//!   the header's `branch_offset` field and is only ever reported.
//!
//! The 24-bit immediate is not sign-extended on decode, so round trips only
//! hold inside the window the immediate can express: `[8, 0x0400_0004)` for
//! [`encode_link`] and `[-248, 0x0400_0000 - 248)` for [`encode_informational`].
//! Anything outside it aliases into the low bits.

/// Top byte of an ARM `b` (always) instruction.
pub const OPCODE_BRANCH: u8 = 0xEA;
/// Top byte of an ARM `bl` (always) instruction.
pub const OPCODE_BRANCH_LINK: u8 = 0xEB;

/// The program counter reads this many bytes past the executing instruction.
const PC_AHEAD: u32 = 8;
/// Bias applied to the header's informational branch offset.
const HEADER_BIAS: i32 = 248;
const IMMEDIATE_MASK: u32 = 0x00FF_FFFF;

/// Returns true if `word` is an unconditional ARM branch, with or without
/// link.
pub fn is_branch(word: u32) -> bool {
    let opcode = (word >> 24) as u8;
    opcode == OPCODE_BRANCH || opcode == OPCODE_BRANCH_LINK
}

/// Encodes a payload offset as a branch-with-link word.
pub fn encode_link(target: u32) -> u32 {
    (u32::from(OPCODE_BRANCH_LINK) << 24) | ((target.wrapping_sub(PC_AHEAD) >> 2) & IMMEDIATE_MASK)
}

/// Decodes the payload offset a branch word points to.
///
/// The opcode byte is ignored, so this works for both branch flavours.
pub fn decode_link(word: u32) -> u32 {
    ((word & IMMEDIATE_MASK) << 2) + PC_AHEAD
}

/// Encodes a header-relative offset as a plain branch word.
pub fn encode_informational(offset: i32) -> u32 {
    let immediate = (offset.wrapping_add(HEADER_BIAS) >> 2) as u32;
    (u32::from(OPCODE_BRANCH) << 24) | (immediate & IMMEDIATE_MASK)
}

/// Decodes the header-relative offset of a plain branch word.
pub fn decode_informational(word: u32) -> i32 {
    ((word & IMMEDIATE_MASK) << 2) as i32 - HEADER_BIAS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_both_branch_flavours() {
        assert!(is_branch(0xEA00_0000));
        assert!(is_branch(0xEBFF_FFFF));
        assert!(!is_branch(0x00EA_0000));
        assert!(!is_branch(0xE1A0_0000));
        assert!(!is_branch(0xFA00_0010));
    }

    #[test]
    fn link_round_trip() {
        for target in (8..0x0010_0000u32).step_by(4).chain([0x0400_0000]) {
            let word = encode_link(target);
            assert_eq!(word >> 24, 0xEB);
            assert_eq!(decode_link(word), target);
        }
    }

    #[test]
    fn informational_round_trip() {
        for offset in (-248..0x0010_0000i32).step_by(4).chain([0x0400_0000 - 252]) {
            let word = encode_informational(offset);
            assert_eq!(word >> 24, 0xEA);
            assert_eq!(decode_informational(word), offset);
        }
    }

    #[test]
    fn known_words() {
        assert_eq!(encode_link(0x1020), 0xEB00_0406);
        assert_eq!(decode_link(0xEB00_0406), 0x1020);
        assert_eq!(decode_informational(0xEA00_0000), -248);
        assert_eq!(encode_informational(8), 0xEA00_0040);
    }

    #[test]
    fn out_of_window_offsets_alias() {
        // Below the pc bias the immediate wraps to the top of the range.
        assert_eq!(decode_link(encode_link(0)), 0x0400_0000);
    }
}
