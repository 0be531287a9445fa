//! HLS: rotating TS segments and a live playlist
//!
//! ```text
//! TsMuxer ─► HlsMuxer ─► Segment (memory / file) ─► Playlist ◄─ HTTP
//! ```

mod jitter;
mod muxer;
mod playlist;
mod segment;

pub use jitter::AacJitter;
pub use muxer::HlsMuxer;
pub use playlist::Playlist;
pub use segment::{
    segment_file_name, FsSegmentFile, MemorySegmentFile, Segment, SegmentFile, SegmentSource,
};
