//! Audio and video tag bodies
//!
//! ```text
//! video: FrameType(4) CodecID(4) | AVCPacketType(1) | CompositionTime(3, signed) | data
//! audio: SoundFormat(4) SoundRate(2) SoundSize(1) SoundType(1) | AACPacketType(1) | data
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::tag::{AudioFormat, AudioSampleRate, VideoCodecId, VideoFrameType};
use crate::codec::aac::AacPacketType;
use crate::codec::h264::AvcPacketType;
use crate::codec::AudioMeta;

/// AVC video tag body
#[derive(Debug, Clone)]
pub struct VideoData {
    pub frame_type: VideoFrameType,
    pub codec_id: VideoCodecId,
    pub packet_type: AvcPacketType,
    /// pts - dts in milliseconds
    pub composition_time: i32,
    pub data: Bytes,
}

impl VideoData {
    /// Sequence header carrying an AVCDecoderConfigurationRecord
    pub fn sequence_header(record: Bytes) -> Self {
        Self {
            frame_type: VideoFrameType::Keyframe,
            codec_id: VideoCodecId::Avc,
            packet_type: AvcPacketType::SequenceHeader,
            composition_time: 0,
            data: record,
        }
    }

    /// Single NAL unit, written with a 4-byte length prefix
    pub fn nalu(keyframe: bool, composition_time: i32, nal: Bytes) -> Self {
        Self {
            frame_type: if keyframe {
                VideoFrameType::Keyframe
            } else {
                VideoFrameType::InterFrame
            },
            codec_id: VideoCodecId::Avc,
            packet_type: AvcPacketType::Nalu,
            composition_time,
            data: nal,
        }
    }

    pub fn encode(&self) -> Bytes {
        let nalu = self.packet_type == AvcPacketType::Nalu;
        let mut buf = BytesMut::with_capacity(5 + 4 + self.data.len());

        buf.put_u8(((self.frame_type as u8) << 4) | self.codec_id as u8);
        buf.put_u8(self.packet_type as u8);
        buf.put_int(self.composition_time as i64, 3);
        if nalu {
            buf.put_u32(self.data.len() as u32);
        }
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

/// AAC audio tag body
#[derive(Debug, Clone)]
pub struct AudioData {
    pub format: AudioFormat,
    pub rate: AudioSampleRate,
    /// 16-bit samples
    pub sample_16bit: bool,
    pub stereo: bool,
    pub packet_type: AacPacketType,
    pub data: Bytes,
}

impl AudioData {
    /// Flags derived from the stream metadata
    fn from_meta(meta: &AudioMeta, packet_type: AacPacketType, data: Bytes) -> Self {
        Self {
            format: AudioFormat::Aac,
            rate: AudioSampleRate::from_hz(meta.sample_rate),
            sample_16bit: meta.sample_size != 8,
            stereo: meta.channels > 1,
            packet_type,
            data,
        }
    }

    /// Sequence header carrying the AudioSpecificConfig
    pub fn sequence_header(meta: &AudioMeta) -> Self {
        Self::from_meta(meta, AacPacketType::SequenceHeader, meta.config.clone())
    }

    /// One raw access unit
    pub fn raw(meta: &AudioMeta, data: Bytes) -> Self {
        Self::from_meta(meta, AacPacketType::Raw, data)
    }

    pub fn encode(&self) -> Bytes {
        let mut flags = ((self.format as u8) << 4) | ((self.rate as u8) << 2);
        if self.sample_16bit {
            flags |= 0x02;
        }
        if self.stereo {
            flags |= 0x01;
        }

        let mut buf = BytesMut::with_capacity(2 + self.data.len());
        buf.put_u8(flags);
        buf.put_u8(self.packet_type as u8);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}
