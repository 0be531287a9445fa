//! Transport stream access units

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::aac::AudioSpecificConfig;
use crate::codec::h264::{nal_type, NAL_AUD, NAL_IDR, NAL_SEI, NAL_SLICE, NAL_SPS};
use crate::pack::Pack;

/// PID carrying H.264
pub const VIDEO_PID: u16 = 0x100;
/// PID carrying AAC
pub const AUDIO_PID: u16 = 0x101;
/// PES stream id for AVC video
pub const STREAM_ID_AVC: u8 = 0xE0;
/// PES stream id for AAC audio
pub const STREAM_ID_AAC: u8 = 0xC0;

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const AUD_NAL: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];

/// One PES payload: codec header bytes followed by the elementary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsFrame {
    pub pid: u16,
    pub stream_id: u8,
    /// 90 kHz
    pub dts: i64,
    /// 90 kHz
    pub pts: i64,
    /// Random access point; gets a PCR
    pub key: bool,
    /// ADTS header, or AUD [+ SPS + PPS] + start code
    pub header: Bytes,
    /// Elementary data without start code
    pub payload: Bytes,
}

impl TsFrame {
    /// H.264 NAL unit; keyframe when it is an IDR slice
    pub fn video(dts: i64, pts: i64, nal: Bytes) -> Self {
        let key = nal.first().map(|&b| nal_type(b) == NAL_IDR).unwrap_or(false);
        Self {
            pid: VIDEO_PID,
            stream_id: STREAM_ID_AVC,
            dts,
            pts,
            key,
            header: Bytes::new(),
            payload: nal,
        }
    }

    /// Raw AAC access unit
    pub fn audio(pts: i64, data: Bytes) -> Self {
        Self {
            pid: AUDIO_PID,
            stream_id: STREAM_ID_AAC,
            dts: pts,
            pts,
            key: false,
            header: Bytes::new(),
            payload: data,
        }
    }

    /// Carried on the video PID
    pub fn is_video(&self) -> bool {
        self.pid == VIDEO_PID
    }

    /// Carried on the audio PID
    pub fn is_audio(&self) -> bool {
        self.pid == AUDIO_PID
    }

    /// IDR slice; starts a new HLS segment
    pub fn is_keyframe(&self) -> bool {
        self.key
    }

    /// Build the Annex B prefix for the NAL unit
    ///
    /// Slices and SEI get an access unit delimiter; IDR slices are also
    /// preceded by the parameter sets. Parameter sets and delimiters
    /// themselves get no start code.
    pub fn prepare_avc_header(&mut self, sps: &[u8], pps: &[u8]) {
        let Some(&first) = self.payload.first() else {
            return;
        };
        let t = nal_type(first);
        let mut header = BytesMut::with_capacity(16 + sps.len() + pps.len());

        if t == NAL_SLICE || t == NAL_IDR || t == NAL_SEI {
            header.put_slice(&AUD_NAL);
        }
        if t == NAL_IDR {
            for set in [sps, pps] {
                if !set.is_empty() {
                    header.put_slice(&START_CODE);
                    header.put_slice(set);
                }
            }
        }

        if !(NAL_SPS..=NAL_AUD).contains(&t) {
            // 4-byte start code at the beginning of the access unit, 3-byte after
            if header.is_empty() {
                header.put_slice(&START_CODE);
            } else {
                header.put_slice(&START_CODE[1..]);
            }
        }
        self.header = header.freeze();
    }

    /// Build the ADTS header for the access unit
    pub fn prepare_aac_header(&mut self, config: &AudioSpecificConfig) {
        let adts = config.adts_header(self.payload.len());
        self.header = Bytes::copy_from_slice(&adts);
    }
}

impl Pack for TsFrame {
    fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F];
    const PPS: &[u8] = &[0x68, 0xEF];

    #[test]
    fn test_idr_header() {
        let mut frame = TsFrame::video(0, 0, Bytes::from_static(&[0x65, 0x88]));
        assert!(frame.is_keyframe());
        frame.prepare_avc_header(SPS, PPS);

        let mut expected = AUD_NAL.to_vec();
        expected.extend_from_slice(&START_CODE);
        expected.extend_from_slice(SPS);
        expected.extend_from_slice(&START_CODE);
        expected.extend_from_slice(PPS);
        expected.extend_from_slice(&[0, 0, 1]);
        assert_eq!(&frame.header[..], &expected[..]);
    }

    #[test]
    fn test_slice_header() {
        let mut frame = TsFrame::video(0, 0, Bytes::from_static(&[0x41, 0x9A]));
        assert!(!frame.is_keyframe());
        frame.prepare_avc_header(SPS, PPS);

        assert_eq!(&frame.header[..], &[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 1]);
    }

    #[test]
    fn test_other_nal_gets_four_byte_start_code() {
        // Filler data (12)
        let mut frame = TsFrame::video(0, 0, Bytes::from_static(&[0x0C, 0xFF]));
        frame.prepare_avc_header(SPS, PPS);
        assert_eq!(&frame.header[..], &START_CODE);

        let mut sps = TsFrame::video(0, 0, Bytes::from_static(SPS));
        sps.prepare_avc_header(SPS, PPS);
        assert!(sps.header.is_empty());
    }

    #[test]
    fn test_adts_header() {
        let config = AudioSpecificConfig::parse(Bytes::from_static(&[0x12, 0x10])).unwrap();
        let mut frame = TsFrame::audio(900, Bytes::from(vec![0u8; 100]));
        frame.prepare_aac_header(&config);

        assert!(frame.is_audio());
        assert_eq!(frame.dts, frame.pts);
        assert_eq!(frame.header.len(), 7);
        assert_eq!(&frame.header[..2], &[0xFF, 0xF1]);
        assert_eq!(frame.size(), 107);
    }
}
