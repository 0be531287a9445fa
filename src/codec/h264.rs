//! H.264 NAL unit types and the AVC decoder configuration record
//!
//! ```text
//! NAL header: F(1) NRI(2) type(5)
//!
//! AVCDecoderConfigurationRecord:
//! 1 | profile | compat | level | 0xFC|lenSize-1 | 0xE0|numSPS | {len(2) SPS}* | numPPS | {len(2) PPS}*
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
/// Access unit delimiter
pub const NAL_AUD: u8 = 9;

// RFC 6184 packetization types
pub const NAL_STAP_A: u8 = 24;
pub const NAL_STAP_B: u8 = 25;
pub const NAL_MTAP16: u8 = 26;
pub const NAL_MTAP24: u8 = 27;
pub const NAL_FU_A: u8 = 28;
pub const NAL_FU_B: u8 = 29;

pub const FU_START: u8 = 0x80;
pub const FU_END: u8 = 0x40;

pub fn nal_type(header: u8) -> u8 {
    header & 0x1F
}

/// Second byte of an FLV AVC tag body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    SequenceHeader = 0,
    Nalu = 1,
}

/// AVCDecoderConfigurationRecord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub level: u8,
    /// Bytes in each NAL unit length prefix
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub raw: Bytes,
}

impl AvcConfig {
    /// Record for one SPS and one PPS with 4-byte length prefixes
    pub fn build(sps: &Bytes, pps: &Bytes) -> Result<Self> {
        let Some(&[profile, compat, level]) = sps.get(1..4) else {
            return Err(MediaError::InvalidParameterSet("sps shorter than 4 bytes").into());
        };
        let (Ok(sps_len), Ok(pps_len)) = (u16::try_from(sps.len()), u16::try_from(pps.len()))
        else {
            return Err(MediaError::InvalidParameterSet("parameter set too large").into());
        };

        let mut buf = BytesMut::with_capacity(11 + sps.len() + pps.len());
        buf.put_slice(&[0x01, profile, compat, level, 0xFC | 3, 0xE0 | 1]);
        buf.put_u16(sps_len);
        buf.put_slice(sps);
        buf.put_u8(1);
        buf.put_u16(pps_len);
        buf.put_slice(pps);

        Ok(Self {
            profile,
            level,
            nalu_length_size: 4,
            sps: vec![sps.clone()],
            pps: vec![pps.clone()],
            raw: buf.freeze(),
        })
    }

    pub fn parse(raw: Bytes) -> Result<Self> {
        let mut cursor = Cursor { data: &raw, pos: 0 };

        if cursor.u8()? != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let profile = cursor.u8()?;
        cursor.u8()?;
        let level = cursor.u8()?;
        let nalu_length_size = (cursor.u8()? & 0x03) + 1;

        let sps_count = cursor.u8()? & 0x1F;
        let sps = (0..sps_count)
            .map(|_| cursor.parameter_set(&raw))
            .collect::<Result<Vec<_>>>()?;
        let pps_count = cursor.u8()?;
        let pps = (0..pps_count)
            .map(|_| cursor.parameter_set(&raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            profile,
            level,
            nalu_length_size,
            sps,
            pps,
            raw,
        })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(MediaError::InvalidAvcPacket)?;
        self.pos += 1;
        Ok(b)
    }

    /// `len(2) | bytes`, sliced out of `raw` without copying
    fn parameter_set(&mut self, raw: &Bytes) -> Result<Bytes> {
        let len = u16::from_be_bytes([self.u8()?, self.u8()?]) as usize;
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let set = raw.slice(self.pos..end);
        self.pos = end;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9];
    const PPS: &[u8] = &[0x68, 0xEF, 0x38];

    #[test]
    fn test_nal_type() {
        assert_eq!(nal_type(0x65), NAL_IDR);
        assert_eq!(nal_type(0x67), NAL_SPS);
        assert_eq!(nal_type(0x7C), NAL_FU_A);
        assert_eq!(nal_type(0x18), NAL_STAP_A);
    }

    #[test]
    fn test_build_layout() {
        let config = AvcConfig::build(&Bytes::from_static(SPS), &Bytes::from_static(PPS)).unwrap();

        let mut expected = vec![0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x06];
        expected.extend_from_slice(SPS);
        expected.extend_from_slice(&[0x01, 0x00, 0x03]);
        expected.extend_from_slice(PPS);

        assert_eq!(&config.raw[..], &expected[..]);
        assert_eq!(config.profile, 0x64);
    }

    #[test]
    fn test_parse_built_record() {
        let built = AvcConfig::build(&Bytes::from_static(SPS), &Bytes::from_static(PPS)).unwrap();
        let parsed = AvcConfig::parse(built.raw.clone()).unwrap();

        assert_eq!(parsed, built);
    }

    #[test]
    fn test_build_rejects_short_sps() {
        let result = AvcConfig::build(&Bytes::from_static(&[0x67, 0x64]), &Bytes::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_bad_records() {
        // Version 2
        let data = Bytes::from_static(&[0x02, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x01, 0x67, 0x00]);
        assert!(AvcConfig::parse(data).is_err());

        // SPS length past the end
        let data = Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x09, 0x67]);
        assert!(AvcConfig::parse(data).is_err());

        // Missing PPS count
        let data = Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x01, 0x67]);
        assert!(AvcConfig::parse(data).is_err());
    }
}
