//! rtp-relay: media relay core for IP-camera streams
//!
//! RTP packets from a camera are reassembled into H.264/HEVC NAL units and
//! AAC access units, cached so late viewers can start on a keyframe, and
//! re-packaged as FLV tags, MPEG-TS packets and HLS segments.
//!
//! ```text
//! interleaved RTP ─► Packet ─► Stream ─┬─► RTP subscribers (cache primed)
//!                                      └─► FrameConverter ─► extractors
//!                                            ─► FlvMuxer ─► FLV subscribers
//!                                            ─► TsMuxer ─► HlsMuxer ─► Playlist
//! ```
//!
//! Every pipeline stage runs on its own [`worker::Worker`] task fed by a
//! [`queue::PackQueue`]; producers only enqueue.
//!
//! SPS and AudioSpecificConfig bit-level decoding of picture parameters is
//! left to the caller through [`codec::ParameterSetDecoder`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtp_relay::codec::{AudioMeta, ParameterSetDecoder, VideoMeta, VideoParams};
//! use rtp_relay::rtp::{ChannelMap, Packet};
//! use rtp_relay::{RelayConfig, Stream};
//!
//! struct Decoder;
//!
//! impl ParameterSetDecoder for Decoder {
//!     fn decode_sps(&self, _sps: &[u8]) -> rtp_relay::Result<VideoParams> {
//!         Ok(VideoParams { width: 1920, height: 1080, frame_rate: 25.0 })
//!     }
//! }
//!
//! # async fn run(frame: bytes::Bytes) -> rtp_relay::Result<()> {
//! let config = RelayConfig::default().hls_fragment(4);
//! let stream = Stream::new("/live/cam1", VideoMeta::h264(), AudioMeta::default(), &config, Arc::new(Decoder));
//!
//! let viewer = stream.subscribe_flv(true)?;
//! stream.write_packet(Arc::new(Packet::decode(frame, &ChannelMap::interleaved())?))?;
//! while let Some(tag) = viewer.recv().await {
//!     // send the tag
//! #   let _ = tag;
//! }
//! # Ok(())
//! # }
//! ```

pub mod amf;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod flv;
pub mod hls;
pub mod mpegts;
pub mod pack;
pub mod queue;
pub mod rtp;
pub mod stream;
pub mod worker;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use pack::Pack;
pub use stream::{Stream, Subscription};
