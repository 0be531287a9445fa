//! FLV tags
//!
//! ```text
//! +---------+-------------+---------------+-------------+---------+
//! | Type(1) | DataSize(3) | TS(3) TSExt(1)| StreamID(3) | Data(N) |
//! +---------+-------------+---------------+-------------+---------+
//! ```

use bytes::Bytes;

use crate::pack::Pack;

pub const TAG_HEADER_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl TryFrom<u8> for FlvTagType {
    type Error = u8;

    /// The filter bit and the two reserved bits are ignored
    fn try_from(b: u8) -> std::result::Result<Self, u8> {
        Ok(match b & 0x1F {
            8 => Self::Audio,
            9 => Self::Video,
            18 => Self::Script,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecId {
    Avc = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Aac = 10,
}

/// SoundRate field of the audio flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleRate {
    Rate5512 = 0,
    Rate11025 = 1,
    Rate22050 = 2,
    Rate44100 = 3,
}

impl AudioSampleRate {
    /// Rates without an exact field value are signalled as 44 kHz
    pub fn from_hz(hz: u32) -> Self {
        match hz {
            5512 => Self::Rate5512,
            11025 => Self::Rate11025,
            22050 => Self::Rate22050,
            _ => Self::Rate44100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    /// Milliseconds
    pub timestamp: u32,
    /// Body, starting with the audio/video flags byte
    pub data: Bytes,
}

impl FlvTag {
    pub fn new(tag_type: FlvTagType, timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type,
            timestamp,
            data,
        }
    }

    /// Video tag; `timestamp` is in milliseconds
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self::new(FlvTagType::Video, timestamp, data)
    }

    /// Audio tag; `timestamp` is in milliseconds
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self::new(FlvTagType::Audio, timestamp, data)
    }

    /// Script data tag, e.g. `onMetaData`
    pub fn script(timestamp: u32, data: Bytes) -> Self {
        Self::new(FlvTagType::Script, timestamp, data)
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// `onMetaData` script tag
    pub fn is_metadata(&self) -> bool {
        self.tag_type == FlvTagType::Script
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_video()
            && matches!(self.data.first(), Some(&b) if b >> 4 == VideoFrameType::Keyframe as u8)
    }

    pub fn is_avc_sequence_header(&self) -> bool {
        self.is_video() && self.codec() == Some(VideoCodecId::Avc as u8) && self.packet_type() == Some(0)
    }

    pub fn is_aac_sequence_header(&self) -> bool {
        self.is_audio() && self.codec() == Some(AudioFormat::Aac as u8) && self.packet_type() == Some(0)
    }

    /// CodecID of a video tag, SoundFormat of an audio tag
    fn codec(&self) -> Option<u8> {
        let flags = *self.data.first()?;
        Some(if self.is_video() { flags & 0x0F } else { flags >> 4 })
    }

    fn packet_type(&self) -> Option<u8> {
        self.data.get(1).copied()
    }

    pub fn with_timestamp(&self, timestamp: u32) -> Self {
        Self::new(self.tag_type, timestamp, self.data.clone())
    }

    /// Tag header; the timestamp's upper byte goes into the extension field
    pub fn encode_header(&self) -> [u8; TAG_HEADER_LEN] {
        let size = (self.data.len() as u32).to_be_bytes();
        let ts = self.timestamp.to_be_bytes();
        [
            self.tag_type as u8,
            size[1],
            size[2],
            size[3],
            ts[1],
            ts[2],
            ts[3],
            ts[0],
            0,
            0,
            0,
        ]
    }
}

impl Pack for FlvTag {
    fn size(&self) -> usize {
        TAG_HEADER_LEN + self.data.len()
    }
}
