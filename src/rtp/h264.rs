//! H.264 RTP depacketization (RFC 6184)
//!
//! Single NAL units pass through, STAP-A packets are split and FU-A
//! fragments are reassembled. A missing fragment silently drops the NAL unit
//! it belongs to; the next start fragment recovers.

use bytes::{Bytes, BytesMut};

use super::fragment::Fragments;
use super::{video_timestamp, FrameExtractor, Packet, SyncClock};
use crate::codec::h264::{nal_type, FU_END, FU_START, NAL_FU_A, NAL_STAP_A};
use crate::codec::{Frame, FrameWriter};
use crate::error::{MediaError, Result};

/// Rebuilds H.264 NAL units from RTP packets
pub struct H264Extractor<W> {
    writer: W,
    clock: SyncClock,
    clock_rate: u32,
    fragments: Fragments,
}

impl<W: FrameWriter> H264Extractor<W> {
    /// `clock_rate` is the RTP clock of the video track, usually 90 kHz
    pub fn new(writer: W, clock_rate: u32) -> Self {
        Self {
            writer,
            clock: SyncClock::default(),
            clock_rate: clock_rate.max(1),
            fragments: Fragments::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn write(&mut self, rtp_time: u32, nal: Bytes) -> Result<()> {
        let abs = video_timestamp(&self.clock, rtp_time, self.clock_rate);
        self.writer.write_frame(Frame::video(abs, rtp_time, nal))
    }

    //  | STAP-A hdr | size (2) | NAL 1 | size (2) | NAL 2 | ...
    fn extract_stap_a(&mut self, rtp_time: u32, payload: &Bytes) -> Result<()> {
        let header = payload[0];
        let mut off = 1;

        while off < payload.len() {
            if off + 2 > payload.len() {
                return Err(MediaError::InvalidAvcPacket.into());
            }
            let size = u16::from_be_bytes([payload[off], payload[off + 1]]) as usize;
            if size < 1 {
                break;
            }
            off += 2;
            if off + size > payload.len() {
                return Err(MediaError::InvalidAvcPacket.into());
            }

            let mut nal = BytesMut::from(&payload[off..off + size]);
            nal[0] = (header & 0x60) | nal_type(nal[0]);
            self.write(rtp_time, nal.freeze())?;

            off += size;
        }
        Ok(())
    }

    //  | FU indicator (F NRI 28) | FU header (S E R type) | fragment
    fn extract_fu_a(&mut self, packet: &Packet, payload: &Bytes) -> Result<()> {
        let indicator = payload[0];
        let fu_header = payload[1];
        let seq = packet.sequence_number();
        let data = payload.slice(2..);

        if fu_header & FU_START != 0 {
            self.fragments.start(seq, packet.timestamp(), data);
            return Ok(());
        }

        if !self.fragments.push(seq, data) {
            tracing::trace!(seq, "FU-A fragment lost, NAL unit dropped");
            return Ok(());
        }

        if fu_header & FU_END != 0 {
            let rtp_time = self.fragments.rtp_time();
            let header = (indicator & 0x60) | nal_type(fu_header);
            let nal = self.fragments.assemble(&[header]);
            self.write(rtp_time, nal)?;
        }
        Ok(())
    }
}

impl<W: FrameWriter> FrameExtractor for H264Extractor<W> {
    fn control(&mut self, packet: &Packet) -> Result<()> {
        self.clock.decode(&packet.data);
        Ok(())
    }

    fn extract(&mut self, packet: &Packet) -> Result<()> {
        let Some(payload) = packet.payload() else {
            return Ok(());
        };
        if payload.len() < 3 {
            return Ok(());
        }

        match nal_type(payload[0]) {
            t if t < NAL_STAP_A => self.write(packet.timestamp(), payload),
            NAL_STAP_A => self.extract_stap_a(packet.timestamp(), &payload),
            NAL_FU_A => self.extract_fu_a(packet, &payload),
            t => Err(MediaError::UnsupportedNalType(t).into()),
        }
    }
}
