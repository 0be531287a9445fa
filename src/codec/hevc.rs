//! HEVC/H.265 NAL units
//!
//! The NAL header is two bytes:
//! ```text
//! |F|   Type    |  LayerId  | TID |
//! ```
//! RTP (RFC 7798) adds aggregation packets (48) and fragmentation units (49)
//! whose FU header is `|S|E| FuType |`.

pub const NAL_IRAP_MIN: u8 = 16;
pub const NAL_IRAP_MAX: u8 = 21;
pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
/// Last type defined by H.265; everything above is RTP or unspecified
pub const NAL_MAX_NATIVE: u8 = 47;

/// Aggregation packet
pub const NAL_AP: u8 = 48;
/// Fragmentation unit
pub const NAL_FU: u8 = 49;

/// NAL unit type from the first header byte
pub fn nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3F
}

/// BLA, IDR and CRA pictures
pub fn is_irap(nal_type: u8) -> bool {
    (NAL_IRAP_MIN..=NAL_IRAP_MAX).contains(&nal_type)
}

/// Rebuild the two-byte NAL header of a fragmented unit
pub fn fu_nal_header(p0: u8, p1: u8, fu_header: u8) -> [u8; 2] {
    [(p0 & 0x81) | ((fu_header & 0x3F) << 1), p1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type() {
        // 0x40 0x01: VPS
        assert_eq!(nal_type(0x40), NAL_VPS);
        assert_eq!(nal_type(0x42), NAL_SPS);
        assert_eq!(nal_type(0x44), NAL_PPS);
        assert_eq!(nal_type(0x26), 19);
        assert_eq!(nal_type(0x62), NAL_FU);
        assert_eq!(nal_type(0x60), NAL_AP);
    }

    #[test]
    fn test_irap_range() {
        assert!(!is_irap(15));
        assert!(is_irap(16));
        assert!(is_irap(19));
        assert!(is_irap(21));
        assert!(!is_irap(22));
    }

    #[test]
    fn test_fu_nal_header() {
        // FU indicator 0x62 0x01, FU header start + IDR_W_RADL
        let header = fu_nal_header(0x62, 0x01, 0x80 | 19);
        assert_eq!(header, [0x26, 0x01]);
        assert_eq!(nal_type(header[0]), 19);
    }
}
