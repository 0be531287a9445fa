//! RTP ingest
//!
//! ```text
//! interleaved bytes ─► Packet ─► FrameConverter ─► FrameExtractor ─► FrameWriter
//!                                  (own task)      H264 / HEVC / AAC
//! ```

mod aac;
mod clock;
mod converter;
mod fragment;
mod h264;
mod hevc;
pub mod packet;

pub use aac::AacExtractor;
pub use clock::SyncClock;
pub use converter::FrameConverter;
pub use h264::H264Extractor;
pub use hevc::HevcExtractor;
pub use packet::{Channel, ChannelMap, Packet, RtpHeader};

use crate::error::Result;

/// Rebuilds frames of one media stream from its RTP and RTCP packets
pub trait FrameExtractor: Send {
    /// Handle an RTCP packet of the stream
    fn control(&mut self, packet: &Packet) -> Result<()>;

    /// Handle an RTP packet of the stream
    fn extract(&mut self, packet: &Packet) -> Result<()>;
}

/// Absolute video time: sender-report mapped, RTP clock milliseconds until then
pub(crate) fn video_timestamp(clock: &SyncClock, rtp_time: u32, clock_rate: u32) -> i64 {
    if clock.is_synced() {
        clock.rtp_to_ntp(rtp_time, clock_rate)
    } else {
        rtp_time as i64 * 1000 / clock_rate as i64
    }
}
