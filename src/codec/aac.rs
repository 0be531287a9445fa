//! AAC decoder configuration and ADTS framing
//!
//! RTP (RFC 3640) and FLV carry raw access units; the decoder parameters
//! travel once as an AudioSpecificConfig. MPEG-TS needs every access unit
//! wrapped in a 7-byte ADTS header built from that config.

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// PCM samples in one AAC access unit
pub const SAMPLES_PER_FRAME: u32 = 1024;

/// ADTS header length without CRC
pub const ADTS_HEADER_LEN: usize = 7;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Frequency index escape: the rate follows as a 24-bit value
const EXPLICIT_RATE: u8 = 0x0F;

/// Second byte of an FLV AAC tag body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    SequenceHeader = 0,
    Raw = 1,
}

/// Leading fields of an AudioSpecificConfig
///
/// ```text
/// objectType(5) frequencyIndex(4) [frequency(24)] channelConfig(4) frameLengthFlag(1) ...
/// ```
///
/// An object type of 31 (escape) is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub frequency_index: u8,
    /// Hz
    pub sample_rate: u32,
    pub channel_config: u8,
    /// 960-sample frames
    pub short_frames: bool,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    pub fn parse(raw: Bytes) -> Result<Self> {
        let mut bits = BitReader::new(&raw);

        let object_type = bits.read(5)? as u8;
        let frequency_index = bits.read(4)? as u8;
        let sample_rate = if frequency_index == EXPLICIT_RATE {
            bits.read(24)?
        } else {
            *SAMPLE_RATES
                .get(frequency_index as usize)
                .ok_or(MediaError::InvalidAacPacket)?
        };
        let channel_config = bits.read(4)? as u8;
        let short_frames = bits.read(1)? == 1;

        Ok(Self {
            object_type,
            frequency_index,
            sample_rate,
            channel_config,
            short_frames,
            raw,
        })
    }

    /// ADTS header for an access unit of `payload_len` bytes
    ///
    /// ADTS carries the MPEG-2 profile (object type - 1), so only object
    /// types 1 to 4 map exactly.
    pub fn adts_header(&self, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
        let frame_len = (payload_len + ADTS_HEADER_LEN) as u64;
        let profile = self.object_type.saturating_sub(1) as u64;

        let fields: [(u64, u32); 13] = [
            (0xFFF, 12), // syncword
            (0, 1),      // MPEG-4
            (0, 2),      // layer
            (1, 1),      // no CRC
            (profile & 0x03, 2),
            (self.frequency_index as u64 & 0x0F, 4),
            (0, 1), // private
            (self.channel_config as u64 & 0x07, 3),
            (0, 2), // original, home
            (0, 2), // copyright id bit, start
            (frame_len & 0x1FFF, 13),
            (0x7FF, 11), // VBR buffer fullness
            (0, 2),      // one raw data block
        ];

        let mut bits = 0u64;
        for (value, width) in fields {
            bits = (bits << width) | value;
        }

        let mut header = [0u8; ADTS_HEADER_LEN];
        header.copy_from_slice(&bits.to_be_bytes()[1..]);
        header
    }
}

/// MSB-first bit reader over a byte slice
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, width: usize) -> Result<u32> {
        if self.pos + width > self.data.len() * 8 {
            return Err(MediaError::InvalidAacPacket.into());
        }
        let mut value = 0u32;
        for _ in 0..width {
            let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc_44100_stereo() -> AudioSpecificConfig {
        AudioSpecificConfig::parse(Bytes::from_static(&[0x12, 0x10])).unwrap()
    }

    #[test]
    fn test_parse_common_configs() {
        let config = lc_44100_stereo();
        assert_eq!(config.object_type, 2);
        assert_eq!(config.frequency_index, 4);
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channel_config, 2);
        assert!(!config.short_frames);

        let cases = [
            (&[0x11, 0x90][..], 48_000, 2),
            (&[0x11, 0x88][..], 48_000, 1),
            (&[0x14, 0x08][..], 16_000, 1),
        ];
        for (data, rate, channels) in cases {
            let config = AudioSpecificConfig::parse(Bytes::copy_from_slice(data)).unwrap();
            assert_eq!(config.sample_rate, rate, "{:02X?}", data);
            assert_eq!(config.channel_config, channels, "{:02X?}", data);
        }
    }

    #[test]
    fn test_parse_explicit_rate() {
        // LC, index 15, 22050 Hz, mono
        let rate: u32 = 22_050;
        let bits: u64 = (2 << 35) | (0x0F << 31) | ((rate as u64) << 7) | (1 << 3);
        let data = Bytes::copy_from_slice(&bits.to_be_bytes()[3..]);

        let config = AudioSpecificConfig::parse(data).unwrap();
        assert_eq!(config.sample_rate, 22_050);
        assert_eq!(config.channel_config, 1);
    }

    #[test]
    fn test_parse_rejects_bad_configs() {
        // Reserved index 13
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x16, 0x90])).is_err());
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x12])).is_err());
        // Explicit rate cut short
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x17, 0x80, 0x00])).is_err());
    }

    #[test]
    fn test_adts_header() {
        let header = lc_44100_stereo().adts_header(100);

        assert_eq!(&header[..2], &[0xFF, 0xF1]);
        // profile LC - 1 = 1, index 4, channel msb 0
        assert_eq!(header[2], 0x50);
        assert_eq!(header[3] >> 6, 2);
        let len = (((header[3] & 0x03) as usize) << 11)
            | ((header[4] as usize) << 3)
            | ((header[5] >> 5) as usize);
        assert_eq!(len, 107);
        assert_eq!(header[5] & 0x1F, 0x1F);
        assert_eq!(header[6], 0xFC);
    }
}
