//! Elementary-stream frames and stream metadata
//!
//! RTP extractors produce [`Frame`]s, muxers consume them. A frame carries a
//! single H.264/HEVC NAL unit (no start code, no length prefix) or a single
//! raw AAC access unit (no ADTS header).

pub mod aac;
pub mod h264;
pub mod hevc;
pub mod timing;

use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::pack::Pack;

/// Frame media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Video,
    Audio,
}

/// Complete audio or video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Media kind
    pub frame_type: FrameType,
    /// Absolute timestamp in milliseconds
    pub abs_timestamp: i64,
    /// RTP timestamp the frame was carried with
    pub rtp_time: u32,
    /// NAL unit or AAC access unit
    pub payload: Bytes,
}

impl Frame {
    /// Create a video frame
    pub fn video(abs_timestamp: i64, rtp_time: u32, payload: Bytes) -> Self {
        Self {
            frame_type: FrameType::Video,
            abs_timestamp,
            rtp_time,
            payload,
        }
    }

    /// Create an audio frame
    pub fn audio(abs_timestamp: i64, rtp_time: u32, payload: Bytes) -> Self {
        Self {
            frame_type: FrameType::Audio,
            abs_timestamp,
            rtp_time,
            payload,
        }
    }

    pub fn is_video(&self) -> bool {
        self.frame_type == FrameType::Video
    }
}

impl Pack for Frame {
    fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Sink for complete frames
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: Frame) -> Result<()>;
}

impl FrameWriter for Vec<Frame> {
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.push(frame);
        Ok(())
    }
}

impl<W: FrameWriter + ?Sized> FrameWriter for Box<W> {
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        (**self).write_frame(frame)
    }
}

/// Video codec announced for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    H264,
    H265,
    #[default]
    None,
}

impl VideoCodec {
    /// Map a codec name as announced in session descriptions
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "H264" => VideoCodec::H264,
            "H265" | "HEVC" => VideoCodec::H265,
            _ => VideoCodec::None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H264"),
            VideoCodec::H265 => write!(f, "H265"),
            VideoCodec::None => write!(f, "none"),
        }
    }
}

/// Audio codec announced for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCodec {
    Aac,
    #[default]
    None,
}

impl AudioCodec {
    /// Map a codec name, `MPEG4-GENERIC` is AAC
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "AAC" | "MPEG4-GENERIC" => AudioCodec::Aac,
            _ => AudioCodec::None,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCodec::Aac => write!(f, "AAC"),
            AudioCodec::None => write!(f, "none"),
        }
    }
}

/// Video stream metadata
#[derive(Debug, Clone)]
pub struct VideoMeta {
    pub codec: VideoCodec,
    /// Kbps
    pub data_rate: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    pub sps: Bytes,
    pub pps: Bytes,
    pub vps: Bytes,
}

impl Default for VideoMeta {
    fn default() -> Self {
        Self {
            codec: VideoCodec::None,
            data_rate: 0.0,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            clock_rate: 90_000,
            sps: Bytes::new(),
            pps: Bytes::new(),
            vps: Bytes::new(),
        }
    }
}

impl VideoMeta {
    /// H.264 metadata with the 90 kHz RTP clock
    pub fn h264() -> Self {
        Self {
            codec: VideoCodec::H264,
            ..Default::default()
        }
    }

    /// HEVC metadata with the 90 kHz RTP clock
    pub fn hevc() -> Self {
        Self {
            codec: VideoCodec::H265,
            ..Default::default()
        }
    }
}

/// Audio stream metadata
#[derive(Debug, Clone, Default)]
pub struct AudioMeta {
    pub codec: AudioCodec,
    /// Kbps
    pub data_rate: f64,
    /// Hz; also the RTP clock rate for AAC
    pub sample_rate: u32,
    /// Bits per sample
    pub sample_size: u32,
    pub channels: u32,
    /// Raw AudioSpecificConfig
    pub config: Bytes,
}

impl AudioMeta {
    /// AAC metadata from a raw AudioSpecificConfig
    pub fn aac(config: Bytes, sample_rate: u32, channels: u32) -> Self {
        Self {
            codec: AudioCodec::Aac,
            data_rate: 0.0,
            sample_rate,
            sample_size: 16,
            channels,
            config,
        }
    }

    pub fn clock_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_aac(&self) -> bool {
        self.codec == AudioCodec::Aac
    }
}

/// Picture parameters decoded from an SPS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Zero when the SPS carries no timing info
    pub frame_rate: f64,
}

/// Decodes sequence parameter sets (exp-Golomb parsing lives outside this crate)
pub trait ParameterSetDecoder: Send + Sync {
    fn decode_sps(&self, sps: &[u8]) -> Result<VideoParams>;
}
