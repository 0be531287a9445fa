//! MPEG-TS packetizer
//!
//! Every output starts with a PAT and a PMT packet announcing H.264 on
//! PID 0x100 and AAC on PID 0x101. Each [`TsFrame`] becomes one PES packet
//! split over 188-byte transport packets:
//!
//! ```text
//! first:  | 0x47 | PUSI+PID | AF?+CC | [AF: len, flags, PCR] | PES header | data
//! others: | 0x47 | PID      | CC     | data
//! last:   | 0x47 | PID      | AF+CC  | AF stuffing (0xFF)    | data
//! ```

use std::io::Write;

use super::frame::{TsFrame, AUDIO_PID};
use super::muxer::TsFrameWriter;
use crate::error::Result;

/// Transport packet size
pub const TS_PACKET_SIZE: usize = 188;

const SYNC_BYTE: u8 = 0x47;

const PAT: &[u8] = &[
    0x47, 0x40, 0x00, 0x10, 0x00, // TS header
    0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, // PSI
    0x00, 0x01, 0xF0, 0x01, // program 1 -> PMT PID 0x1000
    0x2E, 0x70, 0x19, 0x05, // CRC
];

const PMT: &[u8] = &[
    0x47, 0x50, 0x01, 0x10, 0x00, // TS header
    0x02, 0xB0, 0x17, 0x00, 0x01, 0xC1, 0x00, 0x00, // PSI
    0xE1, 0x00, // PCR PID 0x100
    0xF0, 0x00, // program info length
    0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264, PID 0x100
    0x0F, 0xE1, 0x01, 0xF0, 0x00, // AAC, PID 0x101
    0x2F, 0x44, 0xB9, 0x9B, // CRC
];

/// PAT and PMT packets, padded with 0xFF
fn program_tables() -> [u8; 2 * TS_PACKET_SIZE] {
    let mut tables = [0xFF; 2 * TS_PACKET_SIZE];
    tables[..PAT.len()].copy_from_slice(PAT);
    tables[TS_PACKET_SIZE..TS_PACKET_SIZE + PMT.len()].copy_from_slice(PMT);
    tables
}

/// Writes TS frames as transport packets
pub struct TsWriter<W> {
    writer: W,
    video_cc: u8,
    audio_cc: u8,
}

impl<W: Write> TsWriter<W> {
    /// Write the program tables
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(&program_tables())?;
        Ok(Self {
            writer,
            video_cc: 0,
            audio_cc: 0,
        })
    }

    /// Packetize one frame; empty payloads are skipped
    pub fn write_frame(&mut self, frame: &TsFrame) -> Result<()> {
        if frame.payload.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(frame.header.len() + frame.payload.len());
        data.extend_from_slice(&frame.header);
        data.extend_from_slice(&frame.payload);

        let cc = if frame.pid == AUDIO_PID {
            &mut self.audio_cc
        } else {
            &mut self.video_cc
        };

        let last = data.len();
        let mut pos = 0;
        let mut first = true;

        while pos < last {
            let mut pkt = [0u8; TS_PACKET_SIZE];
            *cc = cc.wrapping_add(1);

            pkt[0] = SYNC_BYTE;
            pkt[1] = ((frame.pid >> 8) & 0x1F) as u8;
            pkt[2] = frame.pid as u8;
            pkt[3] = 0x10 | (*cc & 0x0F);
            let mut p = 4;

            if first {
                first = false;
                pkt[1] |= 0x40;

                if frame.key {
                    pkt[3] |= 0x20;
                    pkt[4] = 7;
                    pkt[5] = 0x50; // random access + PCR
                    p = 6;
                    write_pcr(&mut pkt, &mut p, frame.dts);
                }

                pkt[p..p + 3].copy_from_slice(&[0x00, 0x00, 0x01]);
                pkt[p + 3] = frame.stream_id;
                p += 4;

                let mut header_size: u8 = 5;
                let mut flags: u8 = 0x80;
                if frame.dts != frame.pts {
                    header_size += 5;
                    flags |= 0x40;
                }

                let mut pes_size = (last - pos) + header_size as usize + 3;
                if pes_size > 0xFFFF {
                    pes_size = 0;
                }
                pkt[p] = (pes_size >> 8) as u8;
                pkt[p + 1] = pes_size as u8;
                pkt[p + 2] = 0x80; // H.222
                pkt[p + 3] = flags;
                pkt[p + 4] = header_size;
                p += 5;

                write_pts(&mut pkt, &mut p, flags >> 6, frame.pts);
                if frame.dts != frame.pts {
                    write_pts(&mut pkt, &mut p, 1, frame.dts);
                }
            }

            let body_size = TS_PACKET_SIZE - p;
            let in_size = last - pos;
            if body_size <= in_size {
                pkt[p..].copy_from_slice(&data[pos..pos + body_size]);
                pos += body_size;
            } else {
                fill_stuff(&mut pkt, &mut p, body_size - in_size);
                pkt[p..p + in_size].copy_from_slice(&data[pos..]);
                pos = last;
            }

            self.writer.write_all(&pkt)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TsFrameWriter for TsWriter<W> {
    fn write_ts_frame(&mut self, frame: TsFrame) -> Result<()> {
        self.write_frame(&frame)
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// 33-bit base, 6 reserved bits, 9-bit extension (always 0)
fn write_pcr(pkt: &mut [u8; TS_PACKET_SIZE], pos: &mut usize, pcr: i64) {
    let v = pcr;
    pkt[*pos] = (v >> 25) as u8;
    pkt[*pos + 1] = (v >> 17) as u8;
    pkt[*pos + 2] = (v >> 9) as u8;
    pkt[*pos + 3] = (v >> 1) as u8;
    pkt[*pos + 4] = ((v << 7) | 0x7E) as u8;
    pkt[*pos + 5] = 0;
    *pos += 6;
}

/// `prefix(4) PTS[32..30] 1 | PTS[29..15] 1 | PTS[14..0] 1`
fn write_pts(pkt: &mut [u8; TS_PACKET_SIZE], pos: &mut usize, prefix: u8, pts: i64) {
    pkt[*pos] = (prefix << 4) | ((((pts >> 30) & 0x07) as u8) << 1) | 1;

    let mid = ((((pts >> 15) & 0x7FFF) as u16) << 1) | 1;
    pkt[*pos + 1..*pos + 3].copy_from_slice(&mid.to_be_bytes());

    let low = (((pts & 0x7FFF) as u16) << 1) | 1;
    pkt[*pos + 3..*pos + 5].copy_from_slice(&low.to_be_bytes());
    *pos += 5;
}

/// Grow (or add) the adaptation field by `stuff` bytes of 0xFF, shifting
/// what was already written after it
fn fill_stuff(pkt: &mut [u8; TS_PACKET_SIZE], pos: &mut usize, stuff: usize) {
    if pkt[3] & 0x20 != 0 {
        let base = 5 + pkt[4] as usize;
        let len = *pos - base;
        pkt.copy_within(base..base + len, base + stuff);
        pkt[base..base + stuff].fill(0xFF);
        pkt[4] += stuff as u8;
        *pos = base + stuff + len;
        return;
    }

    pkt[3] |= 0x20;
    let base = 4;
    let len = *pos - base;
    pkt.copy_within(base..base + len, base + stuff);
    *pos = base + stuff + len;

    pkt[4] = (stuff - 1) as u8;
    if stuff >= 2 {
        pkt[5] = 0;
        pkt[6..4 + stuff].fill(0xFF);
    }
}
