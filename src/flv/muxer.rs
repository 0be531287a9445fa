//! H.264 (+AAC) frames to FLV tags
//!
//! The first tag is always `onMetaData`. The AVC sequence header (and the
//! AAC one when the stream has audio) follows as soon as both SPS and PPS
//! have been seen, then one tag per frame.
//!
//! Timestamps come from a [`MuxClock`]: synthesized video dts, pts from the
//! frame's absolute time.

use std::sync::Arc;

use chrono::Local;

use super::data::{AudioData, VideoData};
use super::tag::{FlvTag, VideoCodecId};
use super::writer::{FLAG_AUDIO, FLAG_VIDEO};
use crate::amf::{Amf0Encoder, AmfValue};
use crate::codec::h264::{nal_type, AvcConfig, NAL_IDR, NAL_PPS, NAL_SPS};
use crate::codec::timing::MuxClock;
use crate::codec::{AudioMeta, Frame, FrameType, FrameWriter, ParameterSetDecoder, VideoMeta};
use crate::error::{MediaError, Result};
use crate::worker::Worker;

const CREATOR: &str = "rtp-relay";

/// Sink for muxed FLV tags
pub trait TagWriter: Send {
    fn write_tag(&mut self, tag: Arc<FlvTag>) -> Result<()>;
}

impl TagWriter for Vec<Arc<FlvTag>> {
    fn write_tag(&mut self, tag: Arc<FlvTag>) -> Result<()> {
        self.push(tag);
        Ok(())
    }
}

impl<W: TagWriter + ?Sized> TagWriter for Box<W> {
    fn write_tag(&mut self, tag: Arc<FlvTag>) -> Result<()> {
        (**self).write_tag(tag)
    }
}

/// Muxes H.264 and optional AAC frames into FLV tags on its own task
pub struct FlvMuxer {
    worker: Worker<Frame>,
    type_flags: u8,
}

impl FlvMuxer {
    /// Write the metadata tag and spawn the muxing task
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        video: VideoMeta,
        audio: AudioMeta,
        writer: Box<dyn TagWriter>,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Self {
        let mut state = MuxState::new(video, audio, writer, decoder);
        let type_flags = state.type_flags();

        if let Err(e) = state.mux_metadata() {
            tracing::warn!(error = %e, "Failed to write FLV metadata");
        }
        if let Err(e) = state.mux_sequence_header() {
            tracing::warn!(error = %e, "Failed to write FLV sequence header");
        }

        let worker = Worker::spawn("flv-muxer", move |frame: Frame| state.mux_frame(frame));

        Self { worker, type_flags }
    }

    /// Queue a frame for muxing
    pub fn write_frame(&self, frame: Frame) -> Result<()> {
        self.worker.submit(frame);
        Ok(())
    }

    /// FLV header flags for the muxed stream: video, plus audio for AAC
    pub fn type_flags(&self) -> u8 {
        self.type_flags
    }

    pub fn close(&self) {
        self.worker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_closed()
    }

    pub async fn join(&self) {
        self.worker.join().await;
    }
}

impl FrameWriter for Arc<FlvMuxer> {
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        FlvMuxer::write_frame(self, frame)
    }
}

struct MuxState {
    video: VideoMeta,
    audio: AudioMeta,
    writer: Box<dyn TagWriter>,
    decoder: Arc<dyn ParameterSetDecoder>,
    sequence_header_sent: bool,
    clock: MuxClock,
}

impl MuxState {
    fn new(
        video: VideoMeta,
        audio: AudioMeta,
        writer: Box<dyn TagWriter>,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Self {
        let clock = MuxClock::new(video.frame_rate);
        Self {
            video,
            audio,
            writer,
            decoder,
            sequence_header_sent: false,
            clock,
        }
    }

    fn has_audio(&self) -> bool {
        self.audio.is_aac()
    }

    fn type_flags(&self) -> u8 {
        if self.has_audio() {
            FLAG_VIDEO | FLAG_AUDIO
        } else {
            FLAG_VIDEO
        }
    }

    fn write(&mut self, tag: FlvTag) -> Result<()> {
        self.writer.write_tag(Arc::new(tag))
    }

    fn mux_frame(&mut self, frame: Frame) -> Result<()> {
        self.clock.start(frame.abs_timestamp);

        match frame.frame_type {
            FrameType::Video => self.mux_video(frame),
            FrameType::Audio => self.mux_audio(frame),
        }
    }

    fn mux_video(&mut self, frame: Frame) -> Result<()> {
        let Some(&header) = frame.payload.first() else {
            return Err(MediaError::InvalidAvcPacket.into());
        };

        match nal_type(header) {
            NAL_SPS => {
                if self.video.sps.is_empty() {
                    self.video.sps = frame.payload.clone();
                    let params = self.decoder.decode_sps(&frame.payload)?;
                    self.video.width = params.width;
                    self.video.height = params.height;
                    self.video.frame_rate = params.frame_rate;
                    self.clock.set_frame_rate(params.frame_rate);
                    tracing::debug!(
                        width = params.width,
                        height = params.height,
                        frame_rate = params.frame_rate,
                        "Decoded SPS"
                    );
                }
                return self.mux_sequence_header();
            }
            NAL_PPS => {
                if self.video.pps.is_empty() {
                    self.video.pps = frame.payload.clone();
                }
                return self.mux_sequence_header();
            }
            _ => {}
        }

        let (dts, pts) = self.clock.next_video(frame.abs_timestamp);

        let keyframe = nal_type(header) == NAL_IDR;
        let body = VideoData::nalu(keyframe, (pts - dts) as i32, frame.payload).encode();
        self.write(FlvTag::video(dts as u32, body))
    }

    fn mux_audio(&mut self, frame: Frame) -> Result<()> {
        if !self.has_audio() {
            return Ok(());
        }

        let timestamp = self.clock.pts(frame.abs_timestamp) as u32;
        let body = AudioData::raw(&self.audio, frame.payload).encode();
        self.write(FlvTag::audio(timestamp, body))
    }

    fn mux_metadata(&mut self) -> Result<()> {
        let mut properties: Vec<(String, AmfValue)> = Vec::with_capacity(12);
        properties.push(("creator".into(), CREATOR.into()));
        properties.push(("creationdate".into(), Local::now().to_rfc3339().into()));

        if self.has_audio() {
            properties.push(("audiocodecid".into(), 10u32.into()));
            properties.push(("audiodatarate".into(), self.audio.data_rate.into()));
            properties.push(("audiosamplerate".into(), self.audio.sample_rate.into()));
            properties.push(("audiosamplesize".into(), self.audio.sample_size.into()));
            properties.push(("stereo".into(), (self.audio.channels > 1).into()));
        }

        properties.push(("videocodecid".into(), (VideoCodecId::Avc as u32).into()));
        properties.push(("videodatarate".into(), self.video.data_rate.into()));
        properties.push(("framerate".into(), self.video.frame_rate.into()));
        properties.push(("width".into(), self.video.width.into()));
        properties.push(("height".into(), self.video.height.into()));

        let mut encoder = Amf0Encoder::new();
        encoder.write_named("onMetaData", &AmfValue::EcmaArray(properties));
        self.write(FlvTag::script(0, encoder.finish()))
    }

    fn mux_sequence_header(&mut self) -> Result<()> {
        if self.sequence_header_sent || self.video.sps.is_empty() || self.video.pps.is_empty() {
            return Ok(());
        }
        self.sequence_header_sent = true;

        let record = AvcConfig::build(&self.video.sps, &self.video.pps)?;
        let body = VideoData::sequence_header(record.raw).encode();
        self.write(FlvTag::video(0, body))?;

        if self.has_audio() {
            let body = AudioData::sequence_header(&self.audio).encode();
            self.write(FlvTag::audio(0, body))?;
        }
        Ok(())
    }
}
