//! AAC RTP depacketization (RFC 3640, mpeg4-generic AAC-hbr)
//!
//! ```text
//! | AU-headers-length (16, bits) | AU-header 1 | ... | AU-header n | AU 1 | ... | AU n |
//! ```
//!
//! Each AU-header is 16 bits: 13 bits size, 3 bits index. Successive access
//! units in one packet are 1024 samples apart.

use super::{FrameExtractor, Packet, SyncClock};
use crate::codec::aac::SAMPLES_PER_FRAME;
use crate::codec::{Frame, FrameWriter};
use crate::error::{MediaError, Result};

const INDEX_LENGTH: u32 = 3;

/// Splits mpeg4-generic payloads into AAC access units
pub struct AacExtractor<W> {
    writer: W,
    clock: SyncClock,
    sample_rate: u32,
}

impl<W: FrameWriter> AacExtractor<W> {
    pub fn new(writer: W, sample_rate: u32) -> Self {
        Self {
            writer,
            clock: SyncClock::default(),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W: FrameWriter> FrameExtractor for AacExtractor<W> {
    fn control(&mut self, packet: &Packet) -> Result<()> {
        self.clock.decode(&packet.data);
        Ok(())
    }

    fn extract(&mut self, packet: &Packet) -> Result<()> {
        if !self.clock.is_synced() {
            return Ok(());
        }
        let Some(payload) = packet.payload() else {
            return Ok(());
        };
        if payload.len() < 2 {
            return Ok(());
        }

        let headers_bits = u16::from_be_bytes([payload[0], payload[1]]);
        let count = (headers_bits >> 4) as usize;
        let data_offset = 2 + count * 2;
        if data_offset > payload.len() {
            return Err(MediaError::InvalidAacPacket.into());
        }

        let mut rtp_time = packet.timestamp();
        let mut off = data_offset;
        for i in 0..count {
            let h = 2 + i * 2;
            let au_header = u16::from_be_bytes([payload[h], payload[h + 1]]);
            let size = (au_header >> INDEX_LENGTH) as usize;
            if off + size > payload.len() {
                return Err(MediaError::InvalidAacPacket.into());
            }

            let abs = self.clock.rtp_to_ntp(rtp_time, self.sample_rate);
            self.writer
                .write_frame(Frame::audio(abs, rtp_time, payload.slice(off..off + size)))?;

            off += size;
            rtp_time = rtp_time.wrapping_add(SAMPLES_PER_FRAME);
        }
        Ok(())
    }
}
