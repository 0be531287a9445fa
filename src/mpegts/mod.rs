//! MPEG transport stream output
//!
//! ```text
//! Frame ─► TsMuxer ─► TsFrame ─► TsFrameWriter (TsWriter, HlsMuxer)
//! ```

mod frame;
mod muxer;
mod writer;

pub use frame::{TsFrame, AUDIO_PID, STREAM_ID_AAC, STREAM_ID_AVC, VIDEO_PID};
pub use muxer::{TsFrameWriter, TsMuxer};
pub use writer::{TsWriter, TS_PACKET_SIZE};
