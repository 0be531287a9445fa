//! HEVC RTP depacketization (RFC 7798)
//!
//! Packets are ignored until a sender report has been seen, so every frame
//! carries an absolute timestamp. The first VPS, SPS and PPS seen are kept.

use bytes::Bytes;

use super::fragment::Fragments;
use super::{FrameExtractor, Packet, SyncClock};
use crate::codec::h264::{FU_END, FU_START};
use crate::codec::hevc::{fu_nal_header, nal_type, NAL_AP, NAL_FU, NAL_PPS, NAL_SPS, NAL_VPS};
use crate::codec::{Frame, FrameWriter};
use crate::error::{MediaError, Result};

/// Rebuilds HEVC NAL units from RTP packets
pub struct HevcExtractor<W> {
    writer: W,
    clock: SyncClock,
    clock_rate: u32,
    fragments: Fragments,
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl<W: FrameWriter> HevcExtractor<W> {
    pub fn new(writer: W, clock_rate: u32) -> Self {
        Self {
            writer,
            clock: SyncClock::default(),
            clock_rate: clock_rate.max(1),
            fragments: Fragments::new(),
            vps: None,
            sps: None,
            pps: None,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// First VPS, SPS and PPS seen on the stream
    pub fn parameter_sets(&self) -> (Option<&Bytes>, Option<&Bytes>, Option<&Bytes>) {
        (self.vps.as_ref(), self.sps.as_ref(), self.pps.as_ref())
    }

    fn write(&mut self, rtp_time: u32, nal: Bytes) -> Result<()> {
        let slot = match nal_type(nal[0]) {
            NAL_VPS => Some(&mut self.vps),
            NAL_SPS => Some(&mut self.sps),
            NAL_PPS => Some(&mut self.pps),
            _ => None,
        };
        if let Some(slot) = slot {
            slot.get_or_insert_with(|| nal.clone());
        }

        let abs = self.clock.rtp_to_ntp(rtp_time, self.clock_rate);
        self.writer.write_frame(Frame::video(abs, rtp_time, nal))
    }

    //  | PayloadHdr (2) | size (2) | NAL 1 | size (2) | NAL 2 | ...
    fn extract_ap(&mut self, rtp_time: u32, payload: &Bytes) -> Result<()> {
        let mut off = 2;

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

            self.write(rtp_time, payload.slice(off..off + size))?;
            off += size;
        }
        Ok(())
    }

    //  | PayloadHdr (2, type 49) | FU header (S E FuType) | fragment
    fn extract_fu(&mut self, packet: &Packet, payload: &Bytes) -> Result<()> {
        let fu_header = payload[2];
        let seq = packet.sequence_number();
        let data = payload.slice(3..);

        if fu_header & FU_START != 0 {
            self.fragments.start(seq, packet.timestamp(), data);
            return Ok(());
        }

        if !self.fragments.push(seq, data) {
            tracing::trace!(seq, "HEVC fragment lost, NAL unit dropped");
            return Ok(());
        }

        if fu_header & FU_END != 0 {
            let rtp_time = self.fragments.rtp_time();
            let header = fu_nal_header(payload[0], payload[1], fu_header);
            let nal = self.fragments.assemble(&header);
            self.write(rtp_time, nal)?;
        }
        Ok(())
    }
}

impl<W: FrameWriter> FrameExtractor for HevcExtractor<W> {
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
        if payload.len() < 3 {
            return Ok(());
        }

        match nal_type(payload[0]) {
            NAL_AP => self.extract_ap(packet.timestamp(), &payload),
            NAL_FU => self.extract_fu(packet, &payload),
            _ => self.write(packet.timestamp(), payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::packet::rtp_body;
    use crate::rtp::Channel;

    fn video(seq: u16, ts: u32, payload: &[u8]) -> Packet {
        Packet::new(Channel::Video, rtp_body(seq, ts, payload)).unwrap()
    }

    fn synced() -> HevcExtractor<Vec<Frame>> {
        let mut fe = HevcExtractor::new(Vec::new(), 90_000);
        let mut sr = vec![0x80, 200, 0x00, 0x06, 0, 0, 0, 1];
        sr.extend_from_slice(&(0x83AA_7E80u32 + 10).to_be_bytes());
        sr.extend_from_slice(&0u32.to_be_bytes());
        sr.extend_from_slice(&0u32.to_be_bytes());
        sr.extend_from_slice(&[0u8; 8]);
        fe.control(&Packet::new(Channel::VideoControl, Bytes::from(sr)).unwrap())
            .unwrap();
        fe
    }

    #[test]
    fn test_ignored_until_synced() {
        let mut fe = HevcExtractor::new(Vec::new(), 90_000);
        fe.extract(&video(1, 0, &[0x02, 0x01, 0xAA])).unwrap();
        assert!(fe.writer().is_empty());
    }

    #[test]
    fn test_single_nal() {
        let mut fe = synced();
        fe.extract(&video(1, 90_000, &[0x02, 0x01, 0xAA, 0xBB])).unwrap();

        let frames = fe.writer();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], &[0x02, 0x01, 0xAA, 0xBB]);
        assert_eq!(frames[0].abs_timestamp, 11_000);
    }

    #[test]
    fn test_aggregation_packet_keeps_parameter_sets() {
        let vps = [0x40, 0x01, 0x0C];
        let sps = [0x42, 0x01, 0x01, 0x60];
        let mut payload = vec![0x60, 0x01];
        for nal in [&vps[..], &sps[..]] {
            payload.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            payload.extend_from_slice(nal);
        }

        let mut fe = synced();
        fe.extract(&video(1, 0, &payload)).unwrap();

        assert_eq!(fe.writer().len(), 2);
        let (v, s, p) = fe.parameter_sets();
        assert_eq!(&v.unwrap()[..], &vps[..]);
        assert_eq!(&s.unwrap()[..], &sps[..]);
        assert!(p.is_none());
    }

    #[test]
    fn test_fragmentation_unit() {
        let mut fe = synced();
        // IDR_W_RADL (19) split in three
        fe.extract(&video(5, 0, &[0x62, 0x01, 0x80 | 19, 1, 2])).unwrap();
        fe.extract(&video(6, 0, &[0x62, 0x01, 19, 3, 4])).unwrap();
        fe.extract(&video(7, 0, &[0x62, 0x01, 0x40 | 19, 5])).unwrap();

        let frames = fe.writer();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], &[0x26, 0x01, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fragmentation_gap() {
        let mut fe = synced();
        fe.extract(&video(5, 0, &[0x62, 0x01, 0x80 | 19, 1, 2])).unwrap();
        fe.extract(&video(7, 0, &[0x62, 0x01, 0x40 | 19, 5])).unwrap();
        assert!(fe.writer().is_empty());
    }
}
