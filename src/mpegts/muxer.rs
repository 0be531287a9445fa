//! H.264 (+AAC) frames to TS frames
//!
//! Timestamps come from the same [`MuxClock`] as the FLV muxer, scaled to
//! 90 kHz. Audio uses its pts for dts.

use std::sync::Arc;

use bytes::Bytes;

use super::frame::TsFrame;
use crate::codec::aac::AudioSpecificConfig;
use crate::codec::h264::{nal_type, NAL_PPS, NAL_SPS};
use crate::codec::timing::MuxClock;
use crate::codec::{AudioMeta, Frame, FrameType, FrameWriter, ParameterSetDecoder, VideoMeta};
use crate::error::{MediaError, Result};
use crate::worker::Worker;

/// Ticks per millisecond of the MPEG system clock
const TICKS_PER_MS: i64 = 90;

/// Sink for TS frames
pub trait TsFrameWriter: Send {
    fn write_ts_frame(&mut self, frame: TsFrame) -> Result<()>;

    /// Called once when the muxer stops
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl TsFrameWriter for Vec<TsFrame> {
    fn write_ts_frame(&mut self, frame: TsFrame) -> Result<()> {
        self.push(frame);
        Ok(())
    }
}

impl<W: TsFrameWriter + ?Sized> TsFrameWriter for Box<W> {
    fn write_ts_frame(&mut self, frame: TsFrame) -> Result<()> {
        (**self).write_ts_frame(frame)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Muxes H.264 and optional AAC frames into TS frames on its own task
pub struct TsMuxer {
    worker: Worker<Frame>,
}

impl TsMuxer {
    /// Spawn the muxing task; must be called within a tokio runtime
    ///
    /// AAC streams must carry a usable AudioSpecificConfig.
    pub fn new(
        video: VideoMeta,
        audio: AudioMeta,
        writer: Box<dyn TsFrameWriter>,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Result<Self> {
        let mut state = MuxState::new(video, &audio, writer, decoder)?;
        let worker = Worker::spawn("ts-muxer", move |frame: Frame| state.mux_frame(frame));
        Ok(Self { worker })
    }

    /// Queue a frame for muxing
    pub fn write_frame(&self, frame: Frame) -> Result<()> {
        self.worker.submit(frame);
        Ok(())
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

impl FrameWriter for Arc<TsMuxer> {
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        TsMuxer::write_frame(self, frame)
    }
}

struct MuxState {
    sps: Bytes,
    pps: Bytes,
    aac: Option<AudioSpecificConfig>,
    writer: Box<dyn TsFrameWriter>,
    decoder: Arc<dyn ParameterSetDecoder>,
    clock: MuxClock,
}

impl MuxState {
    fn new(
        video: VideoMeta,
        audio: &AudioMeta,
        writer: Box<dyn TsFrameWriter>,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Result<Self> {
        let aac = if audio.is_aac() {
            let config = AudioSpecificConfig::parse(audio.config.clone())?;
            if config.object_type == 0 || config.object_type == 31 {
                return Err(MediaError::UnsupportedAacProfile(config.object_type).into());
            }
            Some(config)
        } else {
            None
        };

        Ok(Self {
            sps: video.sps,
            pps: video.pps,
            aac,
            writer,
            decoder,
            clock: MuxClock::new(video.frame_rate),
        })
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
                if self.sps.is_empty() {
                    self.sps = frame.payload.clone();
                    let params = self.decoder.decode_sps(&frame.payload)?;
                    self.clock.set_frame_rate(params.frame_rate);
                }
                return Ok(());
            }
            NAL_PPS => {
                if self.pps.is_empty() {
                    self.pps = frame.payload;
                }
                return Ok(());
            }
            _ => {}
        }

        let (dts, pts) = self.clock.next_video(frame.abs_timestamp);

        let mut ts_frame = TsFrame::video(dts * TICKS_PER_MS, pts * TICKS_PER_MS, frame.payload);
        ts_frame.prepare_avc_header(&self.sps, &self.pps);
        self.writer.write_ts_frame(ts_frame)
    }

    fn mux_audio(&mut self, frame: Frame) -> Result<()> {
        let Some(config) = &self.aac else {
            return Ok(());
        };

        let pts = self.clock.pts(frame.abs_timestamp) * TICKS_PER_MS;
        let mut ts_frame = TsFrame::audio(pts, frame.payload);
        ts_frame.prepare_aac_header(config);
        self.writer.write_ts_frame(ts_frame)
    }
}

impl Drop for MuxState {
    fn drop(&mut self) {
        if let Err(e) = self.writer.close() {
            tracing::warn!(error = %e, "Failed to close TS output");
        }
    }
}
